//! Вспомогательные функции для работы с директориями

use std::fs;
use std::path::{Path, PathBuf};

use walkdir::WalkDir;

use crate::error::Result;

/// Все записи верхнего уровня директории (файлы и папки), по алфавиту
pub fn list_entries(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut entries = Vec::new();
    for entry in WalkDir::new(dir).min_depth(1).max_depth(1).sort_by_file_name() {
        let entry = entry.map_err(std::io::Error::from)?;
        entries.push(entry.into_path());
    }
    Ok(entries)
}

/// Файлы верхнего уровня, имя которых начинается с `prefix`
pub fn files_with_prefix(dir: &Path, prefix: &str) -> Result<Vec<PathBuf>> {
    Ok(list_entries(dir)?
        .into_iter()
        .filter(|path| path.is_file())
        .filter(|path| {
            path.file_name()
                .and_then(|name| name.to_str())
                .is_some_and(|name| name.starts_with(prefix))
        })
        .collect())
}

/// Удалить каждую запись верхнего уровня как файл.
///
/// Вложенная папка считается ошибкой: внешняя программа кладет в raw и results
/// только файлы.
pub fn remove_files(paths: &[PathBuf]) -> Result<()> {
    for path in paths {
        fs::remove_file(path)?;
    }
    Ok(())
}

/// Текстовое описание содержимого директории для диагностических сообщений
pub fn describe_dir(dir: &Path) -> String {
    match list_entries(dir) {
        Ok(entries) if entries.is_empty() => format!("{} is empty", dir.display()),
        Ok(entries) => {
            let names: Vec<String> = entries
                .iter()
                .filter_map(|p| p.file_name().map(|n| n.to_string_lossy().into_owned()))
                .collect();
            format!("{} contains: {}", dir.display(), names.join(", "))
        }
        Err(e) => format!("{} could not be listed: {}", dir.display(), e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_files_with_prefix_skips_directories() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("G_1000.pth"), b"").unwrap();
        fs::write(dir.path().join("D_1000.pth"), b"").unwrap();
        fs::create_dir(dir.path().join("G_backup")).unwrap();

        let found = files_with_prefix(dir.path(), "G_").unwrap();
        assert_eq!(found, vec![dir.path().join("G_1000.pth")]);
    }

    #[test]
    fn test_list_entries_is_sorted_and_shallow() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("b.flac"), b"").unwrap();
        fs::write(dir.path().join("a.flac"), b"").unwrap();
        fs::create_dir(dir.path().join("nested")).unwrap();
        fs::write(dir.path().join("nested").join("c.flac"), b"").unwrap();

        let entries = list_entries(dir.path()).unwrap();
        assert_eq!(
            entries,
            vec![
                dir.path().join("a.flac"),
                dir.path().join("b.flac"),
                dir.path().join("nested"),
            ]
        );
    }

    #[test]
    fn test_describe_dir() {
        let dir = tempfile::tempdir().unwrap();
        assert!(describe_dir(dir.path()).ends_with("is empty"));

        fs::write(dir.path().join("out.flac"), b"").unwrap();
        assert!(describe_dir(dir.path()).ends_with("contains: out.flac"));

        assert!(describe_dir(&dir.path().join("missing")).contains("could not be listed"));
    }
}
