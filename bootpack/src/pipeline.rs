use std::ffi::OsString;
use std::fs::File;
use std::io::{BufReader, BufWriter, Cursor, Write};
use std::path::{Path, PathBuf};

use bootimg::{
    AddressWarning, BootImage, BootImageBuilder, BootInfoManifest, Component, VendorHeaderInfo,
};
use log::{info, warn};
use ramdisk::{ArchiveManifest, PackWarning};

use crate::error::{BootpackError, Result};

/// Header sidecar written on unpack, read on repack
pub const BOOTINFO_FILE: &str = "bootinfo.txt";
/// Archive manifest sidecar
pub const CPIOLIST_FILE: &str = "cpiolist.txt";
/// Directory the ramdisk is extracted into
pub const INITRD_DIR: &str = "initrd";
/// Ramdisk produced by [`Workspace::repack_ramdisk`]
pub const REPACKED_RAMDISK_FILE: &str = "ramdisk.cpio.gz";

/// Suffix appended to a component file holding a gzip stream
const GZIP_SUFFIX: &str = ".gz";
const GZIP_PROBE: [u8; 3] = [0x1f, 0x8b, 0x08];

/// Caller overrides applied ahead of `bootinfo.txt`.
///
/// A set field wins over the sidecar; unset fields come from the sidecar
/// and then from the header defaults.
#[derive(Debug, Clone, Default)]
pub struct RepackOptions {
    pub base: Option<u32>,
    pub page_size: Option<u32>,
    pub padding_unit: Option<u32>,
    pub board_name: Option<String>,
    pub cmdline: Option<String>,
}

impl RepackOptions {
    /// Manifest pre-seeded with the overrides
    pub fn seed(&self) -> BootInfoManifest {
        BootInfoManifest {
            base: self.base,
            page_size: self.page_size,
            padding_unit: self.padding_unit,
            name: self.board_name.clone(),
            cmdline: self.cmdline.clone(),
            ..Default::default()
        }
    }
}

/// Result of unpacking a boot image
#[derive(Debug, Clone)]
pub struct ImageUnpackReport {
    /// Component files written, in image order
    pub artifacts: Vec<PathBuf>,
    pub padding_unit: u32,
    pub vendor: Option<VendorHeaderInfo>,
    pub address_warnings: Vec<AddressWarning>,
}

/// Result of extracting a ramdisk
#[derive(Debug, Clone)]
pub struct RamdiskUnpackReport {
    pub entries: usize,
    pub compression_level: u32,
    pub vendor: Option<VendorHeaderInfo>,
}

/// Result of writing a repacked ramdisk or image
#[derive(Debug, Clone)]
pub struct RepackReport {
    pub output: PathBuf,
    pub size: u64,
    pub vendor: Option<VendorHeaderInfo>,
    pub pack_warnings: Vec<PackWarning>,
}

/// Working directory holding the unpacked artifacts of one image
///
/// # Example
///
/// ```no_run
/// use bootpack::{RepackOptions, Workspace};
///
/// let work = Workspace::new("work");
/// work.unpack("boot.img").unwrap();
/// // edit work/initrd and work/cpiolist.txt ...
/// work.repack("boot-new.img", &RepackOptions::default()).unwrap();
/// ```
#[derive(Debug, Clone)]
pub struct Workspace {
    root: PathBuf,
}

impl Workspace {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Workspace { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Path of a file inside the workspace
    pub fn path(&self, name: &str) -> PathBuf {
        self.root.join(name)
    }

    /// Unpack an image and extract its ramdisk in one call
    pub fn unpack(&self, image: impl AsRef<Path>) -> Result<ImageUnpackReport> {
        let report = self.unpack_boot_image(image)?;
        let ramdisk = report
            .artifacts
            .iter()
            .find(|p| artifact_stem(p) == Some(Component::Ramdisk.name()))
            .cloned();
        match ramdisk {
            Some(path) => {
                self.unpack_ramdisk(path)?;
            }
            None => warn!("image has no ramdisk, nothing to extract"),
        }
        Ok(report)
    }

    /// Repack the ramdisk and then the image in one call
    pub fn repack(&self, output: impl AsRef<Path>, options: &RepackOptions) -> Result<RepackReport> {
        let ramdisk = self.repack_ramdisk(self.path(REPACKED_RAMDISK_FILE))?;
        let mut report = self.repack_boot_image(output, options)?;
        report.pack_warnings = ramdisk.pack_warnings;
        Ok(report)
    }

    /// Split an image into `bootinfo.txt` and one file per component.
    ///
    /// Components of size zero produce no file. A component starting with
    /// the gzip magic gets a `.gz` suffix.
    pub fn unpack_boot_image(&self, image: impl AsRef<Path>) -> Result<ImageUnpackReport> {
        let image = image.as_ref();
        info!("unpacking {}", image.display());
        std::fs::create_dir_all(&self.root)?;

        let mut bootinfo = Vec::new();
        let parsed = BootImage::parse_with_report(std::fs::read(image)?, &mut bootinfo)?;
        write_atomic(&self.path(BOOTINFO_FILE), &[&bootinfo[..]])?;

        let mut artifacts = Vec::new();
        for component in Component::ALL {
            let Some(data) = parsed.component(component) else {
                continue;
            };
            let path = self.path(&artifact_name(component, data));
            write_atomic(&path, &[data])?;
            info!("wrote {} ({} bytes)", path.display(), data.len());
            artifacts.push(path);
        }

        Ok(ImageUnpackReport {
            artifacts,
            padding_unit: parsed.padding_unit(),
            vendor: parsed.vendor().cloned(),
            address_warnings: parsed.address_warnings().to_vec(),
        })
    }

    /// Extract a ramdisk into `initrd/` and write `cpiolist.txt`.
    ///
    /// Refuses to extract over an existing `initrd/`.
    pub fn unpack_ramdisk(&self, input: impl AsRef<Path>) -> Result<RamdiskUnpackReport> {
        let input = input.as_ref();
        let dest = self.path(INITRD_DIR);
        if dest.exists() {
            return Err(BootpackError::DirectoryExists(dest));
        }

        let data = std::fs::read(input)?;
        let mut cursor = Cursor::new(&data);
        let vendor = VendorHeaderInfo::detect(&mut cursor)?;
        let offset = cursor.position() as usize;

        info!("extracting {} into {}", input.display(), dest.display());
        let manifest = ramdisk::unpack(&data[offset..], &self.root, INITRD_DIR)?;

        let mut text = String::new();
        if let Some(vendor) = &vendor {
            text.push_str(&vendor.to_sidecar());
        }
        text.push_str(&manifest.to_text());
        write_atomic(&self.path(CPIOLIST_FILE), &[text.as_bytes()])?;

        Ok(RamdiskUnpackReport {
            entries: manifest.entries.len(),
            compression_level: manifest.compression_level,
            vendor,
        })
    }

    /// Pack `cpiolist.txt` back into a ramdisk at `output`
    pub fn repack_ramdisk(&self, output: impl AsRef<Path>) -> Result<RepackReport> {
        let output = output.as_ref();
        let text = std::fs::read_to_string(self.required(CPIOLIST_FILE)?)?;
        let manifest = ArchiveManifest::parse(&text)?;
        let vendor = VendorHeaderInfo::from_sidecar(&text);

        let packed = ramdisk::pack(&manifest, &self.root)?;
        let preamble = vendor.as_ref().and_then(|v| v.inject(packed.data.len() as u64));
        let size = match &preamble {
            Some(block) => write_atomic(output, &[&block[..], &packed.data[..]])?,
            None => write_atomic(output, &[&packed.data[..]])?,
        };
        info!("wrote {} ({} bytes)", output.display(), size);

        Ok(RepackReport {
            output: output.to_path_buf(),
            size,
            vendor: preamble.and(vendor),
            pack_warnings: packed.warnings,
        })
    }

    /// Rebuild an image from the component files and `bootinfo.txt`.
    ///
    /// Lookup order: `kernel` or `kernel.gz` (required); `ramdisk.cpio.gz`,
    /// `ramdisk`, `ramdisk.gz`; `second.gz`, `second`; `dt_image.gz`,
    /// `dt_image`.
    pub fn repack_boot_image(
        &self,
        output: impl AsRef<Path>,
        options: &RepackOptions,
    ) -> Result<RepackReport> {
        let output = output.as_ref();

        let mut boot_info = options.seed();
        match std::fs::read_to_string(self.path(BOOTINFO_FILE)) {
            Ok(text) => boot_info.merge(&text)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                warn!("{} not found, using defaults", BOOTINFO_FILE);
            }
            Err(e) => return Err(e.into()),
        }

        let kernel = self
            .find(&["kernel", "kernel.gz"])
            .ok_or_else(|| BootpackError::MissingArtifact(self.path("kernel")))?;
        let mut builder = BootImageBuilder::from_boot_info(std::fs::read(kernel)?, &boot_info);

        match self.find(&[REPACKED_RAMDISK_FILE, "ramdisk", "ramdisk.gz"]) {
            Some(path) => builder = builder.ramdisk(std::fs::read(path)?),
            None => warn!("no ramdisk found, writing an empty one"),
        }
        if let Some(path) = self.find(&["second.gz", "second"]) {
            builder = builder.second(std::fs::read(path)?);
        }
        if let Some(path) = self.find(&["dt_image.gz", "dt_image"]) {
            builder = builder.device_tree(std::fs::read(path)?);
        }

        let payload = builder.build()?;
        let vendor = boot_info.vendor();
        let preamble = vendor.as_ref().and_then(|v| v.inject(payload.len() as u64));
        let size = match &preamble {
            Some(block) => write_atomic(output, &[&block[..], &payload[..]])?,
            None => write_atomic(output, &[&payload[..]])?,
        };
        info!("wrote {} ({} bytes)", output.display(), size);

        Ok(RepackReport {
            output: output.to_path_buf(),
            size,
            vendor: preamble.and(vendor),
            pack_warnings: Vec::new(),
        })
    }

    fn find(&self, candidates: &[&str]) -> Option<PathBuf> {
        candidates
            .iter()
            .map(|name| self.path(name))
            .find(|path| path.is_file())
    }

    fn required(&self, name: &str) -> Result<PathBuf> {
        let path = self.path(name);
        if path.is_file() {
            Ok(path)
        } else {
            Err(BootpackError::MissingArtifact(path))
        }
    }
}

/// Copy `input` minus its vendor preamble to `output`.
///
/// The preamble's mode and name go to `<output>_info.txt`. An input without
/// a preamble is an error.
pub fn remove_preamble(input: impl AsRef<Path>, output: impl AsRef<Path>) -> Result<VendorHeaderInfo> {
    let (input, output) = (input.as_ref(), output.as_ref());
    let mut reader = BufReader::new(File::open(input)?);
    let vendor = VendorHeaderInfo::detect(&mut reader)?.ok_or_else(|| {
        BootpackError::Unsupported(format!("no vendor preamble in {}", input.display()))
    })?;

    let mut tmp = tempfile::NamedTempFile::new_in(parent_dir(output))?;
    {
        let mut writer = BufWriter::new(tmp.as_file_mut());
        std::io::copy(&mut reader, &mut writer)?;
        writer.flush()?;
    }
    tmp.persist(output).map_err(|e| e.error)?;

    write_atomic(&info_path(output), &[vendor.to_sidecar().as_bytes()])?;
    info!("stripped vendor preamble {:?} from {}", vendor.name, input.display());
    Ok(vendor)
}

/// Prepend a vendor preamble to `input`, writing `output`.
///
/// The mode and name are read from `<input>_info.txt`; a `mode` other than
/// `"auto"` overrides the sidecar's mode and a given `name` its name.
pub fn add_preamble(
    input: impl AsRef<Path>,
    output: impl AsRef<Path>,
    mode: &str,
    name: Option<&str>,
) -> Result<VendorHeaderInfo> {
    let (input, output) = (input.as_ref(), output.as_ref());
    let sidecar = match std::fs::read_to_string(info_path(input)) {
        Ok(text) => VendorHeaderInfo::from_sidecar(&text),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => None,
        Err(e) => return Err(e.into()),
    };

    let mode = match (mode, &sidecar) {
        ("auto", Some(info)) => info.mode.clone(),
        ("auto", None) => {
            return Err(BootpackError::MissingArtifact(info_path(input)));
        }
        (mode, _) => mode.to_string(),
    };
    let vendor = VendorHeaderInfo {
        mode,
        name: name
            .map(str::to_string)
            .or_else(|| sidecar.map(|s| s.name))
            .unwrap_or_default(),
    };

    let payload = std::fs::read(input)?;
    let block = vendor
        .inject(payload.len() as u64)
        .ok_or_else(|| BootpackError::Unsupported(format!("vendor preamble mode {:?}", vendor.mode)))?;
    write_atomic(output, &[&block[..], &payload[..]])?;
    Ok(vendor)
}

/// File name for an extracted component
fn artifact_name(component: Component, data: &[u8]) -> String {
    if data.starts_with(&GZIP_PROBE) {
        format!("{}{}", component.name(), GZIP_SUFFIX)
    } else {
        component.name().to_string()
    }
}

fn artifact_stem(path: &Path) -> Option<&str> {
    let name = path.file_name()?.to_str()?;
    Some(name.strip_suffix(GZIP_SUFFIX).unwrap_or(name))
}

/// `<path>_info.txt`
fn info_path(path: &Path) -> PathBuf {
    let mut name = OsString::from(path.as_os_str());
    name.push("_info.txt");
    PathBuf::from(name)
}

fn parent_dir(path: &Path) -> &Path {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    }
}

/// Write `parts` to a temp file next to `path`, then move it into place
fn write_atomic(path: &Path, parts: &[&[u8]]) -> Result<u64> {
    let mut tmp = tempfile::NamedTempFile::new_in(parent_dir(path))?;
    let mut size = 0u64;
    for part in parts {
        tmp.write_all(part)?;
        size += part.len() as u64;
    }
    tmp.persist(path).map_err(|e| e.error)?;
    Ok(size)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_artifact_name() {
        assert_eq!(artifact_name(Component::Kernel, b"\x1f\x8b\x08\x00"), "kernel.gz");
        assert_eq!(artifact_name(Component::DeviceTree, b"QCDT"), "dt_image");
        assert_eq!(artifact_stem(Path::new("w/ramdisk.gz")), Some("ramdisk"));
        assert_eq!(artifact_stem(Path::new("w/second")), Some("second"));
    }

    #[test]
    fn test_info_path() {
        assert_eq!(info_path(Path::new("out/logo.bin")), PathBuf::from("out/logo.bin_info.txt"));
    }

    #[test]
    fn test_options_seed_wins() {
        let options = RepackOptions {
            base: Some(0x8000_0000),
            cmdline: Some("console=null".to_string()),
            ..Default::default()
        };
        let mut info = options.seed();
        info.merge("base:0x10000000\ncmdline:quiet\npage_size:0x1000\n").unwrap();
        assert_eq!(info.base, Some(0x8000_0000));
        assert_eq!(info.cmdline.as_deref(), Some("console=null"));
        assert_eq!(info.page_size, Some(0x1000));
    }

    #[test]
    fn test_ramdisk_dir_guard() {
        let dir = tempfile::tempdir().unwrap();
        let work = Workspace::new(dir.path());
        std::fs::create_dir(work.path(INITRD_DIR)).unwrap();
        std::fs::write(work.path("ramdisk"), b"070701").unwrap();
        assert!(matches!(
            work.unpack_ramdisk(work.path("ramdisk")),
            Err(BootpackError::DirectoryExists(_))
        ));
    }

    #[test]
    fn test_missing_kernel() {
        let dir = tempfile::tempdir().unwrap();
        let work = Workspace::new(dir.path());
        let err = work
            .repack_boot_image(dir.path().join("boot.img"), &RepackOptions::default())
            .unwrap_err();
        assert!(matches!(err, BootpackError::MissingArtifact(_)));
        assert!(!dir.path().join("boot.img").exists());
    }

    #[test]
    fn test_remove_preamble_requires_one() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("plain.img");
        std::fs::write(&input, b"ANDROID!").unwrap();
        assert!(matches!(
            remove_preamble(&input, dir.path().join("out.img")),
            Err(BootpackError::Unsupported(_))
        ));
    }

    #[test]
    fn test_add_preamble_unsupported_mode() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("logo.bin");
        std::fs::write(&input, b"data").unwrap();
        assert!(matches!(
            add_preamble(&input, dir.path().join("out.bin"), "other", Some("LOGO")),
            Err(BootpackError::Unsupported(_))
        ));
        assert!(matches!(
            add_preamble(&input, dir.path().join("out.bin"), "auto", None),
            Err(BootpackError::MissingArtifact(_))
        ));
    }
}
