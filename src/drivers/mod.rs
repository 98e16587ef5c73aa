// src/drivers/mod.rs
// 声明同级目录下的子模块文件
pub mod binary;
pub mod buffer;
pub mod error;
pub mod intake;
pub mod pipeline;
pub mod source;
pub mod text;
pub mod window;
// 公开导出这些模块里的结构体，方便外部调用
pub use buffer::ChannelBuffer;
pub use error::{ConfigError, DecodeError, MonitorError};
pub use intake::{intake_queue, DropOldestReceiver, DropOldestSender, IntakeReceiver, IntakeSender};
pub use pipeline::{decode_datagram, detect_protocol, ApplyOutcome, ChannelTable, Protocol};
pub use source::{Datagram, DatagramSource, DecodedBatch, ManualSource, PacketMeta};
pub use window::{decimate, DisplaySeries};
