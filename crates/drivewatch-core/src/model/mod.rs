/// Data model for discovered drives.
///
/// Re-exports the drive item, its classification, and size formatting.
pub mod classify;
pub mod drive_item;
pub mod size;

pub use classify::{classify, RawDriveType};
pub use drive_item::{trim_separators, DriveItem, DriveType, RootHandle, VolumeSpace};
