use std::path::{Path, PathBuf};

use log::{info, warn};
use regex::{Regex, RegexBuilder};

use crate::*;

/// Absolute paths of the images to extract features from, in the order
/// they will be processed.
pub type SourceFiles = Vec<PathBuf>;

/// Resolve a `dir/name-pattern` argument into the matching regular files.
///
/// The name pattern is a plain filename wildcard (`*`, `?`, `[...]`) matched
/// case-insensitively; it never spans directories. Hidden files (leading `.`)
/// are skipped. If `dir` does not exist the current directory is searched
/// instead. Matches are sorted by file name. No matches is not an error.
pub fn resolve(pattern: &str) -> BowResult<SourceFiles> {
    let (dir, filter) = split_pattern(pattern);
    let dir = if dir.is_dir() {
        std::path::absolute(&dir)?
    } else {
        warn!(
            "{} does not exist, using current dir for source files",
            dir.display()
        );
        std::env::current_dir()?
    };

    info!("source files dir: {}", dir.display());
    info!("source files name filter: {}", filter);

    let re = glob_to_regex(&filter)?;
    let mut files: SourceFiles = Vec::new();
    for entry in dir.read_dir()? {
        let path = entry?.path();
        // follows symlinks, directories are skipped
        if !path.is_file() {
            continue;
        }
        let Some(name) = path.file_name().map(|n| n.to_string_lossy().into_owned()) else {
            continue;
        };
        if !name.starts_with('.') && re.is_match(&name) {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

/// Split a source argument into its directory and file name filter.
/// A bare name means the current directory. A bare directory gives an
/// empty filter, which matches nothing.
fn split_pattern(pattern: &str) -> (PathBuf, String) {
    let path = Path::new(pattern);
    if pattern.ends_with(std::path::MAIN_SEPARATOR) || pattern.ends_with('/') {
        return (path.to_path_buf(), String::new());
    }
    let filter = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let dir = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    };
    (dir, filter)
}

/// Convert a filename wildcard to an anchored, case-insensitive regex.
///
/// `*` and `?` never match `/`. `[abc]`, `[a-z]` and the negated `[!abc]`
/// become character classes; an unterminated `[` is literal.
fn glob_to_regex(pattern: &str) -> Result<Regex, regex::Error> {
    let chars: Vec<char> = pattern.chars().collect();
    let mut re = String::from("^");
    let mut i = 0;
    while i < chars.len() {
        match chars[i] {
            '*' => re.push_str("[^/]*"),
            '?' => re.push_str("[^/]"),
            '[' => match class_end(&chars, i) {
                Some(end) => {
                    re.push('[');
                    let mut j = i + 1;
                    if matches!(chars[j], '!' | '^') {
                        re.push('^');
                        j += 1;
                    }
                    for &c in &chars[j..end] {
                        match c {
                            '-' => re.push('-'),
                            c => re.push_str(&regex::escape(&c.to_string())),
                        }
                    }
                    re.push(']');
                    i = end;
                }
                None => re.push_str(r"\["),
            },
            c => re.push_str(&regex::escape(&c.to_string())),
        }
        i += 1;
    }
    re.push('$');
    RegexBuilder::new(&re).case_insensitive(true).build()
}

/// Index of the `]` closing the set opened at `start`. The first member
/// (after an optional `!`/`^`) may itself be `]`.
fn class_end(chars: &[char], start: usize) -> Option<usize> {
    let mut j = start + 1;
    if matches!(chars.get(j), Some('!' | '^')) {
        j += 1;
    }
    // a set needs at least one member
    j += 1;
    (j..chars.len()).find(|&k| chars[k] == ']')
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use std::fs;

    fn touch(dir: &Path, name: &str) {
        fs::write(dir.join(name), b"").unwrap();
    }

    #[rstest]
    #[case("*.png", "a.png", true)]
    #[case("*.png", "a.jpg", false)]
    #[case("*.png", "a.png.bak", false)]
    #[case("img_??.jpg", "img_01.jpg", true)]
    #[case("img_??.jpg", "img_1.jpg", false)]
    #[case("a+b.png", "a+b.png", true)]
    #[case("a+b.png", "aab.png", false)]
    #[case("*", "anything", true)]
    #[case("*.jpg", "IMG_1.JPG", true)]
    #[case("IMG_?.jpg", "img_2.Jpg", true)]
    #[case("img_[23].jpg", "img_2.jpg", true)]
    #[case("img_[23].jpg", "img_4.jpg", false)]
    #[case("img_[a-c].png", "img_B.png", true)]
    #[case("img_[!23].jpg", "img_2.jpg", false)]
    #[case("img_[!23].jpg", "img_5.jpg", true)]
    #[case("img_[.jpg", "img_[.jpg", true)]
    #[case("", "anything", false)]
    fn wildcard_matching(#[case] pattern: &str, #[case] name: &str, #[case] expected: bool) {
        assert_eq!(glob_to_regex(pattern).unwrap().is_match(name), expected);
    }

    #[rstest]
    #[case("data/train/*.png", "data/train", "*.png")]
    #[case("*.png", ".", "*.png")]
    #[case("/abs/dir/img?.jpg", "/abs/dir", "img?.jpg")]
    #[case("data/train/", "data/train/", "")]
    fn pattern_split(#[case] pattern: &str, #[case] dir: &str, #[case] filter: &str) {
        let (d, f) = split_pattern(pattern);
        assert_eq!(d, PathBuf::from(dir));
        assert_eq!(f, filter);
    }

    #[test]
    fn lists_matching_files_sorted() {
        let tmp = tempfile::tempdir().unwrap();
        for name in ["c.png", "a.png", "b.jpg", "b.png"] {
            touch(tmp.path(), name);
        }
        fs::create_dir(tmp.path().join("d.png")).unwrap();

        let pattern = format!("{}/*.png", tmp.path().display());
        let files = resolve(&pattern).unwrap();
        let names: Vec<_> = files
            .iter()
            .map(|p| p.file_name().unwrap().to_str().unwrap())
            .collect();
        assert_eq!(names, ["a.png", "b.png", "c.png"]);
        assert!(files.iter().all(|p| p.is_absolute()));
    }

    #[rstest]
    #[case("*.jpg", &["IMG_1.JPG", "img_2.jpg", "img_3.jpg"])]
    #[case("img_[23].jpg", &["img_2.jpg", "img_3.jpg"])]
    #[case("*", &["IMG_1.JPG", "img_2.jpg", "img_3.jpg"])]
    fn camera_style_names(#[case] filter: &str, #[case] expected: &[&str]) {
        let tmp = tempfile::tempdir().unwrap();
        for name in ["IMG_1.JPG", "img_2.jpg", ".hidden.jpg", "img_3.jpg"] {
            touch(tmp.path(), name);
        }
        let files = resolve(&format!("{}/{}", tmp.path().display(), filter)).unwrap();
        let names: Vec<_> = files
            .iter()
            .map(|p| p.file_name().unwrap().to_str().unwrap())
            .collect();
        assert_eq!(names, expected);
    }

    #[test]
    fn bare_directory_matches_nothing() {
        let tmp = tempfile::tempdir().unwrap();
        touch(tmp.path(), "a.png");
        assert!(resolve(&format!("{}/", tmp.path().display())).unwrap().is_empty());
        // a mistyped directory falls back to cwd but still lists nothing
        let missing = format!("{}/nope/", tmp.path().display());
        assert!(resolve(&missing).unwrap().is_empty());
    }

    #[test]
    fn no_match_is_empty() {
        let tmp = tempfile::tempdir().unwrap();
        touch(tmp.path(), "a.png");
        let pattern = format!("{}/*.tiff", tmp.path().display());
        assert!(resolve(&pattern).unwrap().is_empty());
    }

    #[test]
    fn missing_dir_falls_back_to_cwd() {
        let tmp = tempfile::tempdir().unwrap();
        let pattern = format!("{}/does/not/exist/*", tmp.path().display());
        let files = resolve(&pattern).unwrap();

        let cwd = std::env::current_dir().unwrap();
        let mut expected: Vec<PathBuf> = cwd
            .read_dir()
            .unwrap()
            .map(|e| e.unwrap())
            .filter(|e| e.path().is_file() && !e.file_name().to_string_lossy().starts_with('.'))
            .map(|e| e.path())
            .collect();
        expected.sort();
        assert_eq!(files.len(), expected.len());
        for (f, e) in files.iter().zip(&expected) {
            assert_eq!(f.parent().unwrap().canonicalize().unwrap(), cwd.canonicalize().unwrap());
            assert_eq!(f.file_name(), e.file_name());
        }
    }
}
