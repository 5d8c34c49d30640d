//! Gradebook archive repair
//!
//! A gradebook download is a zip of per-student submissions. Students upload
//! zips with nested folders, stray files and several attempts; these helpers
//! rebuild the gradebook so every submission can be graded the same way.

use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{Read, Seek};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::{debug, info, warn};
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

/// Archive metadata folders added by macOS
const MACOS_METADATA: &str = "__MACOSX";

pub fn extract_zip<R: Read + Seek>(data: R, dest: &Path) -> Result<()> {
    let mut archive = ZipArchive::new(data)?;

    for i in 0..archive.len() {
        let mut file = archive.by_index(i)?;

        if file.name().contains(MACOS_METADATA) {
            continue;
        }

        // ZIP Slip protection: skip entries that would land outside `dest`
        let file_path = match file.enclosed_name() {
            Some(path) => path.to_owned(),
            None => continue,
        };

        let outpath = dest.join(&file_path);

        if file.is_dir() {
            fs::create_dir_all(&outpath)?;
        } else {
            if let Some(parent) = outpath.parent() {
                fs::create_dir_all(parent)?;
            }
            let mut outfile = File::create(&outpath)?;
            std::io::copy(&mut file, &mut outfile)?;
        }
    }

    Ok(())
}

/// Zip every file below `dir`, paths relative to `dir`
pub fn write_zip(dir: &Path, dest: &Path) -> Result<()> {
    let file = File::create(dest).with_context(|| format!("Failed to create {:?}", dest))?;
    let mut writer = ZipWriter::new(file);
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);

    for path in walk_files(dir)? {
        let name = path
            .strip_prefix(dir)?
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/");
        writer.start_file(name, options)?;
        let mut source = File::open(&path)?;
        std::io::copy(&mut source, &mut writer)?;
    }

    writer.finish()?;
    Ok(())
}

/// All files below `dir`, sorted, skipping macOS metadata folders
fn walk_files(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    let mut pending = vec![dir.to_path_buf()];

    while let Some(current) = pending.pop() {
        for entry in fs::read_dir(&current)? {
            let path = entry?.path();
            if path
                .file_name()
                .is_some_and(|n| n.to_string_lossy() == MACOS_METADATA)
            {
                continue;
            }
            if path.is_dir() {
                pending.push(path);
            } else {
                files.push(path);
            }
        }
    }

    files.sort();
    Ok(files)
}

/// Student id from a gradebook file name (`Task_studentid_attempt_...`)
fn student_id(file_name: &str) -> Option<&str> {
    file_name.split('_').nth(1).filter(|id| !id.is_empty())
}

/// Repairs one downloaded gradebook
#[derive(Debug, Clone)]
pub struct GradebookFix {
    pub task_id: String,
    pub module_code: String,
    /// Suffixes of the files that make up a submission, e.g. `.html`
    pub task_file_extensions: Vec<String>,
    pub gradebook_path: PathBuf,
    /// Where the repaired gradebook is written
    pub work_dir: PathBuf,
}

impl GradebookFix {
    fn output_path(&self) -> PathBuf {
        self.work_dir.join(format!(
            "gradebook_{}_{}_fixed.zip",
            self.module_code, self.task_id
        ))
    }

    fn extract_gradebook(&self, dest: &Path) -> Result<()> {
        let file = File::open(&self.gradebook_path)
            .with_context(|| format!("Failed to open gradebook {:?}", self.gradebook_path))?;
        extract_zip(file, dest).context("Failed to extract gradebook")
    }

    fn is_task_file(&self, name: &str) -> bool {
        self.task_file_extensions
            .iter()
            .any(|ext| name.contains(ext.as_str()))
    }

    /// Flatten submission zips that nest or duplicate their files
    ///
    /// Returns the path of the repaired gradebook.
    pub fn fix_zips(&self) -> Result<PathBuf> {
        info!("Fixing submission zips in {:?}", self.gradebook_path);

        let original = tempfile::tempdir()?;
        let fixed = tempfile::tempdir()?;
        self.extract_gradebook(original.path())?;

        for path in walk_files(original.path())? {
            let Some(name) = path.file_name().map(|n| n.to_os_string()) else {
                continue;
            };
            let dest = fixed.path().join(&name);
            // First file with a given name wins
            if dest.exists() {
                warn!("Duplicate file name {:?} in gradebook, skipped {:?}", name, path);
                continue;
            }

            if path.extension().and_then(|e| e.to_str()) != Some("zip") {
                fs::rename(&path, &dest)?;
                continue;
            }

            match self.repair_submission(&path, &dest) {
                Ok(true) => debug!("Repacked {:?}", name),
                Ok(false) => fs::rename(&path, &dest)?,
                Err(e) => {
                    warn!("Cannot unzip {:?}, kept as is: {:#}", name, e);
                    fs::rename(&path, &dest)?;
                }
            }
        }

        let output = self.output_path();
        write_zip(fixed.path(), &output)?;
        info!("Wrote fixed gradebook to {:?}", output);
        Ok(output)
    }

    /// Repack one submission zip into `dest` if its layout needs it
    fn repair_submission(&self, path: &Path, dest: &Path) -> Result<bool> {
        let archive = ZipArchive::new(File::open(path)?)?;

        let nested = archive
            .file_names()
            .filter(|name| name.contains(self.task_id.as_str()))
            .count();
        let loose = archive.len() - nested;
        if loose <= 1 && nested <= 1 {
            return Ok(false);
        }

        let staging = tempfile::tempdir()?;
        let flat = tempfile::tempdir()?;
        extract_zip(File::open(path)?, staging.path())?;

        for file in walk_files(staging.path())? {
            let Some(name) = file.file_name() else {
                continue;
            };
            if !self.is_task_file(&name.to_string_lossy()) {
                continue;
            }
            let target = flat.path().join(name);
            // First copy of a duplicated file wins
            if target.exists() {
                warn!("Duplicate file name {:?} in submission, skipped {:?}", name, file);
                continue;
            }
            fs::rename(&file, &target)?;
        }

        write_zip(flat.path(), dest)?;
        Ok(true)
    }

    /// Keep only the latest attempt of every student
    ///
    /// Attempt file names end in a timestamp, so the lexicographically last
    /// name per student is the latest attempt. Returns the path of the
    /// repaired gradebook.
    pub fn keep_latest_attempts(&self) -> Result<PathBuf> {
        info!("Removing old attempts from {:?}", self.gradebook_path);

        let original = tempfile::tempdir()?;
        let latest_dir = tempfile::tempdir()?;
        self.extract_gradebook(original.path())?;

        let mut latest: BTreeMap<String, PathBuf> = BTreeMap::new();
        for path in walk_files(original.path())? {
            let name = match path.file_name() {
                Some(name) => name.to_string_lossy().into_owned(),
                None => continue,
            };
            let Some(student) = student_id(&name) else {
                warn!("Skipping {:?}: no student id in file name", name);
                continue;
            };
            let newer = latest
                .get(student)
                .and_then(|p| p.file_name())
                .map_or(true, |current| current.to_string_lossy().as_ref() < name.as_str());
            if newer {
                latest.insert(student.to_string(), path);
            }
        }

        for path in latest.values() {
            if let Some(name) = path.file_name() {
                fs::rename(path, latest_dir.path().join(name))?;
            }
        }

        let output = self.output_path();
        write_zip(latest_dir.path(), &output)?;
        info!(
            "Kept {} submission(s), wrote {:?}",
            latest.len(),
            output
        );
        Ok(output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn zip_bytes(entries: &[(&str, &str)]) -> Vec<u8> {
        let mut writer = ZipWriter::new(std::io::Cursor::new(Vec::new()));
        for (name, content) in entries {
            writer
                .start_file(*name, SimpleFileOptions::default())
                .unwrap();
            writer.write_all(content.as_bytes()).unwrap();
        }
        writer.finish().unwrap().into_inner()
    }

    fn names(zip_path: &Path) -> Vec<String> {
        let archive = ZipArchive::new(File::open(zip_path).unwrap()).unwrap();
        let mut names: Vec<String> = archive.file_names().map(str::to_string).collect();
        names.sort();
        names
    }

    fn fixer(dir: &Path, gradebook: &[(&str, Vec<u8>)]) -> GradebookFix {
        let gradebook_path = dir.join("gradebook.zip");
        let mut writer = ZipWriter::new(File::create(&gradebook_path).unwrap());
        for (name, content) in gradebook {
            writer
                .start_file(*name, SimpleFileOptions::default())
                .unwrap();
            writer.write_all(content).unwrap();
        }
        writer.finish().unwrap();

        GradebookFix {
            task_id: "task_01".to_string(),
            module_code: "CIS1110".to_string(),
            task_file_extensions: vec![".html".to_string()],
            gradebook_path,
            work_dir: dir.to_path_buf(),
        }
    }

    #[test]
    fn test_extract_zip_skips_macos_metadata() {
        let data = zip_bytes(&[("site/index.html", "<p>"), ("__MACOSX/site/._index.html", "x")]);
        let dest = tempfile::tempdir().unwrap();

        extract_zip(std::io::Cursor::new(data), dest.path()).unwrap();

        assert!(dest.path().join("site/index.html").exists());
        assert!(!dest.path().join("__MACOSX").exists());
    }

    #[test]
    fn test_fix_zips_flattens_nested_submission() {
        let dir = tempfile::tempdir().unwrap();
        let nested = zip_bytes(&[
            ("task_01/index.html", "<p>1</p>"),
            ("task_01/old/about.html", "<p>2</p>"),
            ("notes.txt", "ignore"),
        ]);
        let tidy = zip_bytes(&[("index.html", "<p>ok</p>")]);
        let fix = fixer(
            dir.path(),
            &[
                ("Task_s100_attempt_2024-01-01.zip", nested),
                ("Task_s200_attempt_2024-01-02.zip", tidy),
                ("Task_s200_attempt_2024-01-02.txt", b"comments".to_vec()),
            ],
        );

        let output = fix.fix_zips().unwrap();
        assert!(output.ends_with("gradebook_CIS1110_task_01_fixed.zip"));
        assert_eq!(
            names(&output),
            vec![
                "Task_s100_attempt_2024-01-01.zip",
                "Task_s200_attempt_2024-01-02.txt",
                "Task_s200_attempt_2024-01-02.zip",
            ]
        );

        let extracted = tempfile::tempdir().unwrap();
        extract_zip(File::open(&output).unwrap(), extracted.path()).unwrap();
        assert_eq!(
            names(&extracted.path().join("Task_s100_attempt_2024-01-01.zip")),
            vec!["about.html", "index.html"]
        );
        assert_eq!(
            names(&extracted.path().join("Task_s200_attempt_2024-01-02.zip")),
            vec!["index.html"]
        );
    }

    #[test]
    fn test_fix_zips_keeps_unreadable_zip() {
        let dir = tempfile::tempdir().unwrap();
        let fix = fixer(
            dir.path(),
            &[("Task_s300_attempt_2024-01-03.zip", b"not a zip".to_vec())],
        );

        let output = fix.fix_zips().unwrap();
        assert_eq!(names(&output), vec!["Task_s300_attempt_2024-01-03.zip"]);
    }

    #[test]
    fn test_fix_zips_keeps_first_of_colliding_names() {
        let dir = tempfile::tempdir().unwrap();
        let fix = fixer(
            dir.path(),
            &[
                ("a/Task_s400_attempt_2024-01-04.txt", b"first".to_vec()),
                ("b/Task_s400_attempt_2024-01-04.txt", b"second".to_vec()),
            ],
        );

        let output = fix.fix_zips().unwrap();
        assert_eq!(names(&output), vec!["Task_s400_attempt_2024-01-04.txt"]);

        let extracted = tempfile::tempdir().unwrap();
        extract_zip(File::open(&output).unwrap(), extracted.path()).unwrap();
        let content =
            fs::read_to_string(extracted.path().join("Task_s400_attempt_2024-01-04.txt")).unwrap();
        assert_eq!(content, "first");
    }

    #[test]
    fn test_keep_latest_attempts() {
        let dir = tempfile::tempdir().unwrap();
        let fix = fixer(
            dir.path(),
            &[
                ("Task_s100_attempt_2024-01-01-09-00-00.html", b"v1".to_vec()),
                ("Task_s100_attempt_2024-01-02-09-00-00.html", b"v2".to_vec()),
                ("Task_s200_attempt_2024-01-01-10-00-00.html", b"v1".to_vec()),
                ("README", b"no student".to_vec()),
            ],
        );

        let output = fix.keep_latest_attempts().unwrap();
        assert_eq!(
            names(&output),
            vec![
                "Task_s100_attempt_2024-01-02-09-00-00.html",
                "Task_s200_attempt_2024-01-01-10-00-00.html",
            ]
        );
    }

    #[test]
    fn test_student_id() {
        assert_eq!(student_id("Task_s100_attempt_2024.html"), Some("s100"));
        assert_eq!(student_id("README"), None);
    }
}
