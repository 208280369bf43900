use std::path::Path;

use anyhow::Context;
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, Event};
use quick_xml::{Reader, Writer};

use crate::error::{Result, TrainError};

const SCHEMA_NS: &str = "http://www.modernmt.eu/schema/config";
const XSI_NS: &str = "http://www.w3.org/2001/XMLSchema-instance";
const SCHEMA_LOCATION: &str = "http://www.modernmt.eu/schema/config mmt-config-1.0.xsd";

/// Contents of an engine's `engine.xconf`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EngineConfig {
    pub name: String,
    pub source_lang: String,
    pub target_lang: String,
    pub datastream_enabled: bool,
    pub db_enabled: bool,
    pub api_root: Option<String>,
}

impl EngineConfig {
    pub fn new(name: &str, source_lang: &str, target_lang: &str) -> Self {
        Self {
            name: name.to_string(),
            source_lang: source_lang.to_string(),
            target_lang: target_lang.to_string(),
            datastream_enabled: true,
            db_enabled: true,
            api_root: None,
        }
    }

    pub fn from_file(name: &str, path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| TrainError::storage("read engine config", path, e))?;
        Self::parse(name, &text)
            .map_err(|e| TrainError::Config(format!("{}: {e}", path.display())))
    }

    /// Parse xconf text. Absent `enabled` flags mean enabled; anything other than a
    /// case-insensitive `true` means disabled.
    pub fn parse(name: &str, xml: &str) -> std::result::Result<Self, String> {
        let mut reader = Reader::from_str(xml);
        reader.config_mut().trim_text(true);

        let mut source_lang: Option<String> = None;
        let mut target_lang: Option<String> = None;
        let mut datastream_enabled: Option<String> = None;
        let mut db_enabled: Option<String> = None;
        let mut api_root: Option<String> = None;
        let mut stack: Vec<String> = Vec::new();

        loop {
            let ev = reader
                .read_event()
                .map_err(|e| format!("read xml event: {e}"))?;
            let (el, is_empty) = match ev {
                Event::Eof => break,
                Event::Start(e) => (e, false),
                Event::Empty(e) => (e, true),
                Event::End(_) => {
                    stack.pop();
                    continue;
                }
                _ => continue,
            };

            let local = String::from_utf8_lossy(el.local_name().as_ref()).into_owned();
            let in_network = stack.iter().any(|s| s == "network");
            match local.as_str() {
                "engine" if source_lang.is_none() && target_lang.is_none() => {
                    source_lang = attr(&el, "source-language")?;
                    target_lang = attr(&el, "target-language")?;
                }
                "datastream" if datastream_enabled.is_none() => {
                    datastream_enabled = attr(&el, "enabled")?;
                }
                "db" if db_enabled.is_none() => db_enabled = attr(&el, "enabled")?,
                "api" if in_network && api_root.is_none() => api_root = attr(&el, "root")?,
                _ => {}
            }
            if !is_empty {
                stack.push(local);
            }
        }

        let parse_flag = |v: Option<String>| v.map_or(true, |s| s.eq_ignore_ascii_case("true"));
        Ok(Self {
            name: name.to_string(),
            source_lang: source_lang.ok_or("missing engine source-language")?,
            target_lang: target_lang.ok_or("missing engine target-language")?,
            datastream_enabled: parse_flag(datastream_enabled),
            db_enabled: parse_flag(db_enabled),
            api_root,
        })
    }

    pub fn to_xml(&self) -> anyhow::Result<String> {
        let mut w = Writer::new_with_indent(Vec::new(), b' ', 4);
        w.write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))
            .context("write decl")?;
        w.write_event(Event::Start(BytesStart::new("node").with_attributes([
            ("xsi:schemaLocation", SCHEMA_LOCATION),
            ("xmlns", SCHEMA_NS),
            ("xmlns:xsi", XSI_NS),
        ])))
        .context("write node")?;
        w.write_event(Event::Empty(BytesStart::new("engine").with_attributes([
            ("source-language", self.source_lang.as_str()),
            ("target-language", self.target_lang.as_str()),
        ])))
        .context("write engine")?;
        if !self.datastream_enabled {
            let el = BytesStart::new("datastream").with_attributes([("enabled", "false")]);
            w.write_event(Event::Empty(el)).context("write datastream")?;
        }
        if !self.db_enabled {
            let el = BytesStart::new("db").with_attributes([("enabled", "false")]);
            w.write_event(Event::Empty(el)).context("write db")?;
        }
        if let Some(root) = &self.api_root {
            let api = BytesStart::new("api").with_attributes([("root", root.as_str())]);
            w.write_event(Event::Start(BytesStart::new("network")))
                .context("write network")?;
            w.write_event(Event::Empty(api)).context("write api")?;
            w.write_event(Event::End(BytesEnd::new("network")))
                .context("write network")?;
        }
        w.write_event(Event::End(BytesEnd::new("node")))
            .context("write node")?;

        let mut out = String::from_utf8(w.into_inner()).context("engine config is not utf-8")?;
        out.push('\n');
        Ok(out)
    }

    pub fn store(&self, path: &Path) -> Result<()> {
        let xml = self
            .to_xml()
            .map_err(|e| TrainError::Config(format!("{}: {e:#}", path.display())))?;
        std::fs::write(path, xml).map_err(|e| TrainError::storage("write engine config", path, e))
    }
}

fn attr(el: &BytesStart<'_>, name: &str) -> std::result::Result<Option<String>, String> {
    let Some(a) = el
        .try_get_attribute(name)
        .map_err(|e| format!("attribute {name}: {e}"))?
    else {
        return Ok(None);
    };
    let value = a
        .unescape_value()
        .map_err(|e| format!("attribute {name}: {e}"))?;
    Ok(Some(value.into_owned()))
}

#[cfg(test)]
mod tests {
    use super::EngineConfig;

    #[test]
    fn parses_languages_and_flags() {
        let xml = r#"<node xmlns="http://www.modernmt.eu/schema/config">
            <engine source-language="en" target-language="it" />
            <datastream enabled="FALSE" />
            <db enabled="True" />
            <network><api root="/translate" /></network>
        </node>"#;
        let cfg = EngineConfig::parse("europarl", xml).expect("parse");
        assert_eq!(cfg.name, "europarl");
        assert_eq!(cfg.source_lang, "en");
        assert_eq!(cfg.target_lang, "it");
        assert!(!cfg.datastream_enabled);
        assert!(cfg.db_enabled);
        assert_eq!(cfg.api_root.as_deref(), Some("/translate"));
    }

    #[test]
    fn absent_flags_default_to_enabled() {
        let xml = r#"<node><engine source-language="en" target-language="de"/></node>"#;
        let cfg = EngineConfig::parse("default", xml).expect("parse");
        assert!(cfg.datastream_enabled);
        assert!(cfg.db_enabled);
        assert_eq!(cfg.api_root, None);
    }

    #[test]
    fn api_outside_network_is_ignored() {
        let xml = r#"<node>
            <engine source-language="en" target-language="de"/>
            <api root="/x"/>
        </node>"#;
        let cfg = EngineConfig::parse("default", xml).expect("parse");
        assert_eq!(cfg.api_root, None);
    }

    #[test]
    fn missing_engine_element_is_an_error() {
        let err = EngineConfig::parse("default", "<node><db enabled=\"true\"/></node>")
            .err()
            .expect("must fail");
        assert!(err.contains("source-language"));
    }

    #[test]
    fn stored_config_reads_back() {
        let mut cfg = EngineConfig::new("news", "en", "fr");
        cfg.db_enabled = false;
        cfg.api_root = Some("/api".to_string());

        let xml = cfg.to_xml().expect("xml");
        assert!(xml.contains(r#"<engine source-language="en" target-language="fr"/>"#));
        assert_eq!(EngineConfig::parse("news", &xml).expect("parse"), cfg);
    }
}
