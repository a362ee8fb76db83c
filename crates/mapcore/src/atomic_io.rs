use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

/// Writes `text` next to `path` first and moves it into place, so readers
/// never observe a half-written document.
pub(crate) fn write_document_atomic(path: &Path, text: &str) -> io::Result<()> {
    if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }

    let staging = staging_path_for(path);
    let staged = File::create(&staging).and_then(|mut file| {
        file.write_all(text.as_bytes())?;
        file.sync_all()
    });
    if let Err(error) = staged {
        let _ = fs::remove_file(&staging);
        return Err(error);
    }
    move_into_place(&staging, path)
}

fn move_into_place(staging: &Path, target: &Path) -> io::Result<()> {
    if fs::rename(staging, target).is_ok() {
        return Ok(());
    }

    // Some platforms refuse to rename over an existing file.
    match fs::remove_file(target) {
        Ok(()) => {}
        Err(error) if error.kind() == io::ErrorKind::NotFound => {}
        Err(error) => {
            let _ = fs::remove_file(staging);
            return Err(error);
        }
    }
    fs::rename(staging, target).inspect_err(|_| {
        let _ = fs::remove_file(staging);
    })
}

fn staging_path_for(path: &Path) -> PathBuf {
    let file_name = path
        .file_name()
        .and_then(|name| name.to_str())
        .unwrap_or("document.xml");
    path.with_file_name(format!(".{file_name}.saving"))
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use super::*;

    #[test]
    fn replaces_existing_file_and_leaves_no_staging_file() {
        let temp = TempDir::new().expect("temp");
        let path = temp.path().join("maps").join("level.xml");
        write_document_atomic(&path, "first").expect("first write");
        write_document_atomic(&path, "second").expect("second write");

        assert_eq!(fs::read_to_string(&path).expect("read"), "second");
        let leftovers = fs::read_dir(path.parent().expect("parent"))
            .expect("read dir")
            .filter_map(Result::ok)
            .filter(|entry| entry.file_name().to_string_lossy().ends_with(".saving"))
            .count();
        assert_eq!(leftovers, 0);
    }

    #[test]
    fn staging_file_sits_next_to_target() {
        let staging = staging_path_for(Path::new("data/level.xml"));
        assert_eq!(staging, PathBuf::from("data/.level.xml.saving"));
    }
}
