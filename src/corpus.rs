use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use once_cell::sync::Lazy;
use regex::Regex;

/// `<name>.<lang>`, where lang looks like `en`, `zh-CN` or `pt_BR`.
static CORPUS_FILE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(?P<name>[^.].*)\.(?P<lang>[A-Za-z]{2,3}(?:[-_][A-Za-z0-9]{2,8})?)$")
        .expect("corpus file regex")
});

/// A named bundle of text files sharing a directory, one file per language.
///
/// Corpora never change in place: a step that "produces" a corpus writes new files
/// somewhere else and returns a new `Corpus` pointing at them.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Corpus {
    name: String,
    dir: PathBuf,
    langs: Vec<String>,
}

impl Corpus {
    pub fn new(name: impl Into<String>, dir: impl Into<PathBuf>, langs: Vec<String>) -> Self {
        let mut langs = langs;
        langs.sort();
        langs.dedup();
        Self {
            name: name.into(),
            dir: dir.into(),
            langs,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn langs(&self) -> &[String] {
        &self.langs
    }

    pub fn has_lang(&self, lang: &str) -> bool {
        self.langs.iter().any(|l| l == lang)
    }

    pub fn path(&self, lang: &str) -> PathBuf {
        self.dir.join(format!("{}.{}", self.name, lang))
    }

    pub fn is_bilingual(&self, source_lang: &str, target_lang: &str) -> bool {
        self.has_lang(source_lang) && self.has_lang(target_lang)
    }

    /// Expose this corpus under `dest_dir`, optionally renamed, without copying data.
    ///
    /// Fails with `AlreadyExists` rather than replace a file already at the destination.
    pub fn symlink(&self, dest_dir: &Path, name: Option<&str>) -> io::Result<Corpus> {
        fs::create_dir_all(dest_dir)?;
        let name = name.unwrap_or(&self.name);
        for lang in &self.langs {
            let src = self.path(lang);
            let src = src.canonicalize().unwrap_or(src);
            let dst = dest_dir.join(format!("{name}.{lang}"));
            if dst.symlink_metadata().is_ok() {
                return Err(io::Error::new(
                    io::ErrorKind::AlreadyExists,
                    format!("{} already exists", dst.display()),
                ));
            }
            link_file(&src, &dst)?;
        }
        Ok(Corpus::new(name, dest_dir, self.langs.clone()))
    }
}

#[cfg(unix)]
fn link_file(src: &Path, dst: &Path) -> io::Result<()> {
    std::os::unix::fs::symlink(src, dst)
}

#[cfg(not(unix))]
fn link_file(src: &Path, dst: &Path) -> io::Result<()> {
    fs::copy(src, dst).map(|_| ())
}

/// Every corpus found directly under `root`, sorted by name.
///
/// A missing root yields no corpora.
pub fn list(root: &Path) -> io::Result<Vec<Corpus>> {
    let entries = match fs::read_dir(root) {
        Ok(entries) => entries,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e),
    };

    let mut by_name: BTreeMap<String, Vec<String>> = BTreeMap::new();
    for entry in entries {
        let entry = entry?;
        if entry.path().is_dir() {
            continue;
        }
        let file_name = entry.file_name();
        let Some(file_name) = file_name.to_str() else {
            continue;
        };
        let Some(caps) = CORPUS_FILE_RE.captures(file_name) else {
            continue;
        };
        by_name
            .entry(caps["name"].to_string())
            .or_default()
            .push(caps["lang"].to_string());
    }

    Ok(by_name
        .into_iter()
        .map(|(name, langs)| Corpus::new(name, root, langs))
        .collect())
}

/// Split corpora into (bilingual, monolingual) for a language pair.
///
/// Bilingual corpora carry both languages; monolingual ones carry the target language
/// only and feed language-model training. Source-only corpora are ignored.
pub fn split(
    corpora: Vec<Corpus>,
    source_lang: &str,
    target_lang: &str,
) -> (Vec<Corpus>, Vec<Corpus>) {
    let mut bilingual = Vec::new();
    let mut monolingual = Vec::new();
    for corpus in corpora {
        if corpus.is_bilingual(source_lang, target_lang) {
            bilingual.push(corpus);
        } else if corpus.has_lang(target_lang) {
            monolingual.push(corpus);
        }
    }
    (bilingual, monolingual)
}

/// The first corpus name carried by more than one of `corpora`.
pub fn duplicate_name(corpora: &[Corpus]) -> Option<&str> {
    let mut seen = BTreeSet::new();
    corpora
        .iter()
        .map(Corpus::name)
        .find(|name| !seen.insert(*name))
}

/// Recursive size of a file or directory; unreadable entries count as zero.
pub fn disk_usage(path: &Path) -> u64 {
    let Ok(meta) = fs::metadata(path) else {
        return 0;
    };
    if !meta.is_dir() {
        return meta.len();
    }
    let mut total = 0u64;
    if let Ok(entries) = fs::read_dir(path) {
        for entry in entries.flatten() {
            total += disk_usage(&entry.path());
        }
    }
    total
}

#[cfg(test)]
mod tests {
    use super::*;

    fn touch(dir: &Path, name: &str, body: &str) {
        fs::write(dir.join(name), body).expect("write corpus file");
    }

    #[test]
    fn list_groups_files_by_name() {
        let tmp = tempfile::tempdir().expect("tempdir");
        touch(tmp.path(), "europarl.en", "hello\n");
        touch(tmp.path(), "europarl.it", "ciao\n");
        touch(tmp.path(), "news.it", "notizie\n");
        touch(tmp.path(), "checkpoint.json", "[]");
        touch(tmp.path(), ".hidden.en", "x");

        let corpora = list(tmp.path()).expect("list");
        assert_eq!(corpora.len(), 2);
        assert_eq!(corpora[0].name(), "europarl");
        assert_eq!(corpora[0].langs(), ["en".to_string(), "it".to_string()]);
        assert_eq!(corpora[1].name(), "news");
    }

    #[test]
    fn split_separates_bilingual_and_monolingual() {
        let tmp = tempfile::tempdir().expect("tempdir");
        touch(tmp.path(), "a.en", "x");
        touch(tmp.path(), "a.it", "x");
        touch(tmp.path(), "b.it", "x");
        touch(tmp.path(), "c.en", "x");
        touch(tmp.path(), "d.fr", "x");

        let (bi, mono) = split(list(tmp.path()).expect("list"), "en", "it");
        assert_eq!(bi.iter().map(Corpus::name).collect::<Vec<_>>(), ["a"]);
        assert_eq!(mono.iter().map(Corpus::name).collect::<Vec<_>>(), ["b"]);
    }

    #[test]
    fn missing_root_is_empty() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let corpora = list(&tmp.path().join("nope")).expect("list");
        assert!(corpora.is_empty());
    }

    #[test]
    fn symlink_renames_without_touching_source() {
        let src = tempfile::tempdir().expect("tempdir");
        let dst = tempfile::tempdir().expect("tempdir");
        touch(src.path(), "europarl.en", "hello\n");
        touch(src.path(), "europarl.it", "ciao\n");
        let corpus = list(src.path()).expect("list").remove(0);

        let linked = corpus.symlink(dst.path(), Some("1")).expect("symlink");
        assert_eq!(linked.name(), "1");
        assert_eq!(fs::read_to_string(linked.path("it")).expect("read"), "ciao\n");
        assert!(src.path().join("europarl.it").exists());
    }

    #[test]
    fn symlink_refuses_to_replace_an_existing_file() {
        let src = tempfile::tempdir().expect("tempdir");
        let dst = tempfile::tempdir().expect("tempdir");
        touch(src.path(), "news.it", "notizie\n");
        touch(dst.path(), "1.it", "ciao\n");
        let corpus = list(src.path()).expect("list").remove(0);

        let err = corpus.symlink(dst.path(), Some("1")).err().expect("must fail");
        assert_eq!(err.kind(), io::ErrorKind::AlreadyExists);
        assert_eq!(fs::read_to_string(dst.path().join("1.it")).expect("read"), "ciao\n");
    }

    #[test]
    fn duplicate_name_spots_the_same_corpus_in_two_roots() {
        let a = tempfile::tempdir().expect("tempdir");
        let b = tempfile::tempdir().expect("tempdir");
        touch(a.path(), "europarl.en", "x");
        touch(b.path(), "europarl.it", "y");
        touch(b.path(), "ted.it", "z");

        let mut corpora = list(a.path()).expect("list");
        assert_eq!(duplicate_name(&corpora), None);
        corpora.extend(list(b.path()).expect("list"));
        assert_eq!(duplicate_name(&corpora), Some("europarl"));
    }

    #[test]
    fn disk_usage_is_recursive() {
        let tmp = tempfile::tempdir().expect("tempdir");
        touch(tmp.path(), "a.en", "12345");
        fs::create_dir(tmp.path().join("sub")).expect("mkdir");
        touch(&tmp.path().join("sub"), "b.en", "123");
        assert_eq!(disk_usage(tmp.path()), 8);
    }
}
