pub mod encoder;
pub mod fs_storage;

pub use encoder::{encode_frame, EncodedFrame};
pub use fs_storage::FsFrameStorage;
