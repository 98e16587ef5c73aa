// src/bin/sim_sender.rs
// 模拟采集端：按文本或二进制协议向监视器发送数据
use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use daq_monitor::drivers::binary::{encode_binary, volts_to_code, BinaryHeader};
use daq_monitor::drivers::text::encode_text;
use log::info;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::f64::consts::TAU;
use std::net::{SocketAddr, UdpSocket};
use std::thread;
use std::time::{Duration, Instant};

const BINARY_CHANNELS: u16 = 8;
const BINARY_SAMPLES: u16 = 10;

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum SendFormat {
    Text,
    Binary,
}

#[derive(Parser, Debug)]
#[command(about = "Sends simulated sensor packets to daq-monitor over UDP")]
struct Args {
    /// Monitor address.
    #[arg(long, default_value = "127.0.0.1:5005")]
    target: SocketAddr,

    #[arg(long, value_enum, default_value_t = SendFormat::Text)]
    format: SendFormat,

    /// Samples per second per device.
    #[arg(long, default_value_t = 100.0)]
    rate: f64,

    /// Stop after this many seconds (0 = until interrupted).
    #[arg(long, default_value_t = 0.0)]
    seconds: f64,

    /// Seed for the noise channels.
    #[arg(long)]
    seed: Option<u64>,
}

enum Waveform {
    Sine,
    Noise,
}

struct SimDevice {
    name: &'static str,
    channels: usize,
    waveform: Waveform,
}

// 两个模拟设备：4 路正弦 + 2 路噪声
const DEVICES: [SimDevice; 2] = [
    SimDevice {
        name: "Dev_AI217",
        channels: 4,
        waveform: Waveform::Sine,
    },
    SimDevice {
        name: "Dev_AI208",
        channels: 2,
        waveform: Waveform::Noise,
    },
];

/// Channel `ch` carries a `1 + ch` Hz sine of 5 V amplitude.
fn sine(ch: usize, t: f64) -> f64 {
    (TAU * (1.0 + ch as f64) * t).sin() * 5.0
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();
    anyhow::ensure!(
        args.rate.is_finite() && args.rate > 0.0,
        "--rate must be positive"
    );

    let socket = UdpSocket::bind("0.0.0.0:0").context("failed to bind sender socket")?;
    socket
        .connect(args.target)
        .with_context(|| format!("failed to target {}", args.target))?;
    let mut rng = match args.seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    };
    info!(
        "sending {:?} packets to {} at {:.1} Hz",
        args.format, args.target, args.rate
    );

    // 二进制模式每包 10 个样本
    let per_packet = match args.format {
        SendFormat::Text => 1,
        SendFormat::Binary => usize::from(BINARY_SAMPLES),
    };
    let interval = Duration::from_secs_f64(per_packet as f64 / args.rate);
    let stop_after = (args.seconds > 0.0).then(|| Duration::from_secs_f64(args.seconds));

    let start = Instant::now();
    let mut packet_id: u64 = 0;
    let mut sample_index: u64 = 0;
    loop {
        let loop_start = Instant::now();
        let elapsed = loop_start - start;
        if stop_after.is_some_and(|limit| elapsed >= limit) {
            break;
        }

        match args.format {
            SendFormat::Text => {
                let t = elapsed.as_secs_f64();
                for dev in &DEVICES {
                    let values: Vec<f64> = (0..dev.channels)
                        .map(|ch| match dev.waveform {
                            Waveform::Sine => sine(ch, t),
                            Waveform::Noise => rng.gen_range(-2.0..2.0),
                        })
                        .collect();
                    let line = encode_text(dev.name, elapsed.as_millis() as u64, packet_id, &values);
                    socket.send(line.as_bytes()).context("send failed")?;
                }
            }
            SendFormat::Binary => {
                let header = BinaryHeader {
                    seq_id: packet_id as u32,
                    timestamp: elapsed.as_secs_f64(),
                    sample_count: BINARY_SAMPLES,
                    channel_count: BINARY_CHANNELS,
                };
                let mut codes = Vec::with_capacity(header.code_count());
                for s in 0..u64::from(BINARY_SAMPLES) {
                    let t = (sample_index + s) as f64 / args.rate;
                    for ch in 0..usize::from(BINARY_CHANNELS) {
                        codes.push(volts_to_code(sine(ch, t)));
                    }
                }
                socket
                    .send(&encode_binary(&header, &codes))
                    .context("send failed")?;
            }
        }
        packet_id += 1;
        sample_index += per_packet as u64;

        if packet_id % 1_000 == 0 {
            info!("{} packets sent", packet_id);
        }
        if let Some(rest) = interval.checked_sub(loop_start.elapsed()) {
            thread::sleep(rest);
        }
    }
    info!("done: {} packets in {:.1}s", packet_id, start.elapsed().as_secs_f64());
    Ok(())
}
