//! Baseline domain map: one numeric domain per bilingual training corpus.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::corpus::Corpus;
use crate::error::{Result, TrainError};

pub const DOMAINS_FILENAME: &str = "baseline_domains.json";

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Domain {
    #[serde(with = "id_as_string")]
    pub id: u32,
    pub name: String,
}

/// Ids are written as JSON strings (`"id": "1"`).
mod id_as_string {
    use serde::{de, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(id: &u32, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&id.to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<u32, D::Error> {
        let raw = String::deserialize(d)?;
        raw.parse().map_err(de::Error::custom)
    }
}

pub struct BaselineDatabase {
    path: PathBuf,
}

impl BaselineDatabase {
    /// The database stored under `db_dir` (an engine's `models/db`).
    pub fn new(db_dir: &Path) -> Self {
        Self {
            path: db_dir.to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn domains_file(&self) -> PathBuf {
        self.path.join(DOMAINS_FILENAME)
    }

    /// Assign ids 1..=n to the bilingual corpora, in order, and persist the map.
    ///
    /// Returns the corpora exposed under `output`: bilingual ones renamed to their
    /// domain id, monolingual ones under their own name. A monolingual corpus named
    /// like one of the ids is rejected before anything is written.
    pub fn generate(
        &self,
        bilingual: &[Corpus],
        monolingual: &[Corpus],
        output: &Path,
    ) -> Result<(Vec<Corpus>, Vec<Corpus>)> {
        let domains: Vec<Domain> = bilingual
            .iter()
            .zip(1u32..)
            .map(|(corpus, id)| Domain {
                id,
                name: corpus.name().to_string(),
            })
            .collect();
        if let Some(clash) = monolingual
            .iter()
            .find(|c| domains.iter().any(|d| d.id.to_string() == c.name()))
        {
            return Err(TrainError::InvalidArgument(format!(
                "monolingual corpus '{}' has the same name as a domain id, rename it",
                clash.name()
            )));
        }

        fs::create_dir_all(&self.path)
            .map_err(|e| TrainError::storage("create domain db dir", &self.path, e))?;
        let json = serde_json::to_string_pretty(&domains)
            .map_err(|e| TrainError::Config(format!("serialize domains: {e}")))?;
        let file = self.domains_file();
        fs::write(&file, json).map_err(|e| TrainError::storage("write domain map", &file, e))?;

        let mut bi_out = Vec::with_capacity(bilingual.len());
        for (corpus, domain) in bilingual.iter().zip(&domains) {
            let linked = corpus
                .symlink(output, Some(&domain.id.to_string()))
                .map_err(|e| TrainError::storage("link domain corpus", output, e))?;
            bi_out.push(linked);
        }
        let mut mono_out = Vec::with_capacity(monolingual.len());
        for corpus in monolingual {
            let linked = corpus
                .symlink(output, None)
                .map_err(|e| TrainError::storage("link monolingual corpus", output, e))?;
            mono_out.push(linked);
        }
        Ok((bi_out, mono_out))
    }

    pub fn load(&self) -> Result<Vec<Domain>> {
        let file = self.domains_file();
        let text = fs::read_to_string(&file)
            .map_err(|e| TrainError::storage("read domain map", &file, e))?;
        serde_json::from_str(&text)
            .map_err(|e| TrainError::Config(format!("{}: {e}", file.display())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::corpus;

    fn corpora(dir: &Path, names: &[&str], langs: &[&str]) -> Vec<Corpus> {
        for name in names {
            for lang in langs {
                fs::write(dir.join(format!("{name}.{lang}")), format!("{name} {lang}\n"))
                    .expect("write");
            }
        }
        corpus::list(dir).expect("list")
    }

    #[test]
    fn ids_are_dense_and_follow_input_order() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let raw = tmp.path().join("raw");
        fs::create_dir_all(&raw).expect("mkdir");
        let bi = corpora(&raw, &["europarl", "ted"], &["en", "it"]);
        let mono_dir = tmp.path().join("mono");
        fs::create_dir_all(&mono_dir).expect("mkdir");
        let mono = corpora(&mono_dir, &["news"], &["it"]);

        let db = BaselineDatabase::new(&tmp.path().join("db"));
        let out = tmp.path().join("training_corpora");
        let (bi_out, mono_out) = db.generate(&bi, &mono, &out).expect("generate");

        let names: Vec<&str> = bi_out.iter().map(Corpus::name).collect();
        assert_eq!(names, ["1", "2"]);
        assert_eq!(mono_out[0].name(), "news");
        assert_eq!(
            fs::read_to_string(bi_out[1].path("en")).expect("read"),
            "ted en\n"
        );

        let domains = db.load().expect("load");
        assert_eq!(
            domains,
            vec![
                Domain { id: 1, name: "europarl".into() },
                Domain { id: 2, name: "ted".into() },
            ]
        );
        let raw_json = fs::read_to_string(db.domains_file()).expect("read");
        assert!(raw_json.contains(r#""id": "1""#));
    }

    #[test]
    fn monolingual_corpus_named_like_a_domain_id_is_rejected() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let raw = tmp.path().join("raw");
        fs::create_dir_all(&raw).expect("mkdir");
        let bi = corpora(&raw, &["europarl"], &["en", "it"]);
        let mono_dir = tmp.path().join("mono");
        fs::create_dir_all(&mono_dir).expect("mkdir");
        let mono = corpora(&mono_dir, &["1"], &["it"]);

        let db = BaselineDatabase::new(&tmp.path().join("db"));
        let out = tmp.path().join("training_corpora");
        let err = db.generate(&bi, &mono, &out).err().expect("must fail");
        assert!(matches!(err, TrainError::InvalidArgument(_)));
        assert!(err.to_string().contains("'1'"));
        assert!(!db.domains_file().exists());
        assert!(!out.join("1.it").exists());
    }

    #[test]
    fn generating_twice_gives_the_same_map() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let raw = tmp.path().join("raw");
        fs::create_dir_all(&raw).expect("mkdir");
        let bi = corpora(&raw, &["a", "b", "c"], &["en", "de"]);

        let db = BaselineDatabase::new(&tmp.path().join("db"));
        db.generate(&bi, &[], &tmp.path().join("first")).expect("first");
        let first = db.load().expect("load");
        db.generate(&bi, &[], &tmp.path().join("second")).expect("second");
        assert_eq!(db.load().expect("load"), first);
    }
}
