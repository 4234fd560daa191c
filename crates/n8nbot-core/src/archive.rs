//! Backup archive writer (tar.gz or zip).

use std::{
    fs::{self, File},
    io::{self, Read},
    path::{Path, PathBuf},
    str::FromStr,
};

use flate2::{write::GzEncoder, Compression};
use sha2::{Digest, Sha256};
use zip::{write::FileOptions, CompressionMethod, ZipWriter};

use crate::{errors::Error, Result};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ArchiveFormat {
    TarGz,
    Zip,
}

impl ArchiveFormat {
    pub fn extension(self) -> &'static str {
        match self {
            ArchiveFormat::TarGz => "tar.gz",
            ArchiveFormat::Zip => "zip",
        }
    }
}

impl FromStr for ArchiveFormat {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "tar.gz" | "tgz" | "tar" | "gz" => Ok(ArchiveFormat::TarGz),
            "zip" => Ok(ArchiveFormat::Zip),
            other => Err(Error::Config(format!(
                "BACKUP_FORMAT must be `tar.gz` or `zip`, got {other:?}"
            ))),
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ArchiveSummary {
    /// Number of regular files stored.
    pub files: usize,
    /// Size of the finished archive on disk.
    pub bytes: u64,
    /// Lowercase hex SHA-256 of the finished archive.
    pub sha256: String,
}

/// All regular files below `dir`, sorted, as paths relative to `dir`.
///
/// Symlinks are not followed.
pub fn list_files(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut out = Vec::new();
    collect_files(dir, dir, &mut out)?;
    out.sort();
    Ok(out)
}

fn collect_files(root: &Path, dir: &Path, out: &mut Vec<PathBuf>) -> Result<()> {
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let ft = entry.file_type()?;
        let path = entry.path();
        if ft.is_dir() {
            collect_files(root, &path, out)?;
        } else if ft.is_file() {
            let rel = path
                .strip_prefix(root)
                .map_err(|_| Error::InvalidPath {
                    path: path.clone(),
                    reason: format!("not below {}", root.display()),
                })?
                .to_path_buf();
            out.push(rel);
        }
    }
    Ok(())
}

/// Pack every file below `src_dir` into `dest`.
///
/// Entries are stored as `<src_dir name>/<relative path>` so the archive
/// unpacks into a single folder.
pub fn write_archive(src_dir: &Path, dest: &Path, format: ArchiveFormat) -> Result<ArchiveSummary> {
    let root_name = src_dir
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| "backup".to_string());
    let files = list_files(src_dir)?;

    match format {
        ArchiveFormat::TarGz => write_tar_gz(src_dir, &root_name, &files, dest)?,
        ArchiveFormat::Zip => write_zip(src_dir, &root_name, &files, dest)?,
    }

    let bytes = fs::metadata(dest)?.len();
    Ok(ArchiveSummary {
        files: files.len(),
        bytes,
        sha256: sha256_file(dest)?,
    })
}

fn write_tar_gz(src_dir: &Path, root_name: &str, files: &[PathBuf], dest: &Path) -> Result<()> {
    let out = File::create(dest)?;
    let mut builder = tar::Builder::new(GzEncoder::new(out, Compression::default()));
    builder.follow_symlinks(false);

    for rel in files {
        let name = Path::new(root_name).join(rel);
        builder.append_path_with_name(src_dir.join(rel), &name)?;
    }

    builder.into_inner()?.finish()?;
    Ok(())
}

fn write_zip(src_dir: &Path, root_name: &str, files: &[PathBuf], dest: &Path) -> Result<()> {
    let out = File::create(dest)?;
    let mut zip = ZipWriter::new(out);
    let options = FileOptions::default()
        .compression_method(CompressionMethod::Deflated)
        .unix_permissions(0o600);

    for rel in files {
        // Zip entry names always use forward slashes.
        let name = format!(
            "{root_name}/{}",
            rel.to_string_lossy().replace('\\', "/")
        );
        zip.start_file(name, options)?;
        let mut f = File::open(src_dir.join(rel))?;
        io::copy(&mut f, &mut zip)?;
    }

    zip.finish()?;
    Ok(())
}

pub fn sha256_file(path: &Path) -> Result<String> {
    let mut f = File::open(path)?;
    let mut hasher = Sha256::new();
    let mut buf = [0u8; 64 * 1024];
    loop {
        let n = f.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(format!("{:x}", hasher.finalize()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::tmp_dir;
    use flate2::read::GzDecoder;

    fn populate(root: &Path) -> PathBuf {
        let src = root.join("n8n-backup");
        fs::create_dir_all(src.join("workflows")).unwrap();
        fs::create_dir_all(src.join("config")).unwrap();
        fs::write(src.join("workflows/1.json"), r#"{"id":"1"}"#).unwrap();
        fs::write(src.join("workflows/2.json"), r#"{"id":"2"}"#).unwrap();
        fs::write(src.join("config/.env"), "N8N_HOST=x").unwrap();
        src
    }

    #[test]
    fn parses_formats() {
        assert_eq!("tar.gz".parse::<ArchiveFormat>().unwrap(), ArchiveFormat::TarGz);
        assert_eq!("ZIP".parse::<ArchiveFormat>().unwrap(), ArchiveFormat::Zip);
        assert!("rar".parse::<ArchiveFormat>().is_err());
    }

    #[test]
    fn lists_files_recursively_and_sorted() {
        let root = tmp_dir("n8nbot-archive-list");
        let src = populate(&root);
        let files = list_files(&src).unwrap();
        assert_eq!(
            files,
            vec![
                PathBuf::from("config/.env"),
                PathBuf::from("workflows/1.json"),
                PathBuf::from("workflows/2.json"),
            ]
        );
        let _ = fs::remove_dir_all(&root);
    }

    #[test]
    fn tar_gz_contains_all_files_under_root_folder() {
        let root = tmp_dir("n8nbot-archive-tgz");
        let src = populate(&root);
        let dest = root.join("out.tar.gz");

        let summary = write_archive(&src, &dest, ArchiveFormat::TarGz).unwrap();
        assert_eq!(summary.files, 3);
        assert_eq!(summary.bytes, fs::metadata(&dest).unwrap().len());
        assert_eq!(summary.sha256.len(), 64);

        let mut ar = tar::Archive::new(GzDecoder::new(File::open(&dest).unwrap()));
        let mut names: Vec<String> = ar
            .entries()
            .unwrap()
            .map(|e| e.unwrap().path().unwrap().to_string_lossy().to_string())
            .collect();
        names.sort();
        assert_eq!(
            names,
            vec![
                "n8n-backup/config/.env",
                "n8n-backup/workflows/1.json",
                "n8n-backup/workflows/2.json",
            ]
        );
        let _ = fs::remove_dir_all(&root);
    }

    #[test]
    fn zip_contains_all_files() {
        let root = tmp_dir("n8nbot-archive-zip");
        let src = populate(&root);
        let dest = root.join("out.zip");

        let summary = write_archive(&src, &dest, ArchiveFormat::Zip).unwrap();
        assert_eq!(summary.files, 3);

        let mut zip = zip::ZipArchive::new(File::open(&dest).unwrap()).unwrap();
        assert_eq!(zip.len(), 3);
        let mut body = String::new();
        zip.by_name("n8n-backup/workflows/1.json")
            .unwrap()
            .read_to_string(&mut body)
            .unwrap();
        assert_eq!(body, r#"{"id":"1"}"#);
        let _ = fs::remove_dir_all(&root);
    }

    #[test]
    fn sha256_matches_known_digest() {
        let root = tmp_dir("n8nbot-archive-sha");
        let p = root.join("abc.txt");
        fs::write(&p, "abc").unwrap();
        assert_eq!(
            sha256_file(&p).unwrap(),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
        let _ = fs::remove_dir_all(&root);
    }
}
