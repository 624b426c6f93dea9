pub mod error;
pub mod pipeline;

pub use error::{BootpackError, Result};
pub use pipeline::{
    add_preamble, remove_preamble, ImageUnpackReport, RamdiskUnpackReport, RepackOptions,
    RepackReport, Workspace, BOOTINFO_FILE, CPIOLIST_FILE, INITRD_DIR, REPACKED_RAMDISK_FILE,
};

// Re-export underlying crates
pub use bootimg;
pub use ramdisk;
