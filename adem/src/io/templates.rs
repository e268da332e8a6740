//! Startup-built page templates.
//!
//! Templates live in one directory and follow a naming convention:
//! `*.page.html` are renderable pages, `*.layout.html` and `*.partial.html`
//! are only reachable through `{% extends %}` and `{% include %}`.

use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use minijinja::{Environment, UndefinedBehavior};
use tracing::debug;

use crate::core::types::ResultPayload;

pub const PAGE_SUFFIX: &str = ".page.html";
pub const LAYOUT_SUFFIX: &str = ".layout.html";
pub const PARTIAL_SUFFIX: &str = ".partial.html";

const TEMPLATE_SUFFIXES: [&str; 3] = [PAGE_SUFFIX, LAYOUT_SUFFIX, PARTIAL_SUFFIX];

/// Failure to produce a page body.
#[derive(Debug, thiserror::Error)]
pub enum RenderError {
    #[error("template not found: {0}")]
    NotFound(String),
    #[error("render template {name}: {source}")]
    Render {
        name: String,
        #[source]
        source: minijinja::Error,
    },
}

/// Immutable mapping from page name to compiled template.
#[derive(Debug)]
pub struct TemplateCache {
    env: Environment<'static>,
    pages: BTreeSet<String>,
}

impl TemplateCache {
    /// Load and compile every template in `dir`.
    ///
    /// Each page is rendered once against an empty payload, so a syntax error,
    /// a missing layout or partial, or a reference to an unknown field fails
    /// here instead of on the first request.
    pub fn build(dir: &Path) -> Result<Self> {
        let mut env = Environment::new();
        env.set_undefined_behavior(UndefinedBehavior::Strict);

        let mut pages = BTreeSet::new();
        for (name, path) in template_files(dir)? {
            let source = fs::read_to_string(&path)
                .with_context(|| format!("read template {}", path.display()))?;
            env.add_template_owned(name.clone(), source)
                .with_context(|| format!("parse template {}", path.display()))?;
            if name.ends_with(PAGE_SUFFIX) {
                pages.insert(name);
            }
        }

        if pages.is_empty() {
            bail!("no *{PAGE_SUFFIX} templates in {}", dir.display());
        }

        let cache = Self { env, pages };
        let probe = ResultPayload::default();
        for name in &cache.pages {
            cache
                .render(name, &probe)
                .with_context(|| format!("check template {name}"))?;
        }

        debug!(dir = %dir.display(), pages = cache.pages.len(), "template cache built");
        Ok(cache)
    }

    pub fn page_names(&self) -> impl Iterator<Item = &str> {
        self.pages.iter().map(String::as_str)
    }

    /// Render page `name` with `payload`.
    pub fn render(&self, name: &str, payload: &ResultPayload) -> Result<String, RenderError> {
        if !self.pages.contains(name) {
            return Err(RenderError::NotFound(name.to_string()));
        }
        let render_err = |source| RenderError::Render {
            name: name.to_string(),
            source,
        };
        let template = self.env.get_template(name).map_err(render_err)?;
        template.render(payload).map_err(render_err)
    }
}

/// Template files in `dir` sorted by name, ignoring anything without a known suffix.
fn template_files(dir: &Path) -> Result<Vec<(String, PathBuf)>> {
    let entries =
        fs::read_dir(dir).with_context(|| format!("read template dir {}", dir.display()))?;

    let mut files = Vec::new();
    for entry in entries {
        let entry = entry.with_context(|| format!("read template dir {}", dir.display()))?;
        let path = entry.path();
        if !path.is_file() {
            continue;
        }
        let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        let name = name.to_string();
        if TEMPLATE_SUFFIXES.iter().any(|suffix| name.ends_with(suffix)) {
            files.push((name, path));
        }
    }
    files.sort();
    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;

    const LAYOUT: &str = "<html><body>{% block main %}{% endblock %}{% include \"footer.partial.html\" %}</body></html>";
    const FOOTER: &str = "<footer>Built {{ time }}</footer>";
    const QUERY_PAGE: &str = "{% extends \"base.layout.html\" %}{% block main %}<input value=\"{{ query_input }}\">{% for line in query_result %}<p>{{ line }}</p>{% endfor %}{% endblock %}";

    fn write_templates(dir: &Path, files: &[(&str, &str)]) {
        for (name, body) in files {
            fs::write(dir.join(name), body).expect("write template");
        }
    }

    fn standard_dir() -> tempfile::TempDir {
        let temp = tempfile::tempdir().expect("tempdir");
        write_templates(
            temp.path(),
            &[
                ("base.layout.html", LAYOUT),
                ("footer.partial.html", FOOTER),
                ("adem.page.html", QUERY_PAGE),
                ("notes.txt", "ignored"),
            ],
        );
        temp
    }

    #[test]
    fn build_registers_only_pages() {
        let temp = standard_dir();
        let cache = TemplateCache::build(temp.path()).expect("build");
        let pages: Vec<_> = cache.page_names().collect();
        assert_eq!(pages, ["adem.page.html"]);
    }

    #[test]
    fn render_fills_layout_partial_and_payload() {
        let temp = standard_dir();
        let cache = TemplateCache::build(temp.path()).expect("build");
        let payload = ResultPayload {
            query_input: "6 4".to_string(),
            query_result: vec!["Result: 1".to_string(), "Time elapsed: 2ms".to_string()],
            time: "Jan 2, 2006 15:04:05 UTC".to_string(),
        };
        let body = cache.render("adem.page.html", &payload).expect("render");
        assert!(body.contains("value=\"6 4\""));
        assert!(body.contains("<p>Result: 1</p>"));
        assert!(body.contains("<p>Time elapsed: 2ms</p>"));
        assert!(body.contains("Built Jan 2, 2006 15:04:05 UTC"));
    }

    #[test]
    fn render_escapes_html() {
        let temp = standard_dir();
        let cache = TemplateCache::build(temp.path()).expect("build");
        let payload = ResultPayload {
            query_result: vec!["<script>".to_string()],
            ..ResultPayload::default()
        };
        let body = cache.render("adem.page.html", &payload).expect("render");
        assert!(body.contains("&lt;script&gt;"));
        assert!(!body.contains("<script>"));
    }

    #[test]
    fn render_unknown_page_is_not_found() {
        let temp = standard_dir();
        let cache = TemplateCache::build(temp.path()).expect("build");
        for name in ["missing.page.html", "base.layout.html", ""] {
            let err = cache
                .render(name, &ResultPayload::default())
                .expect_err("should fail");
            assert!(
                matches!(err, RenderError::NotFound(ref n) if n == name),
                "{err}"
            );
        }
    }

    #[test]
    fn build_fails_on_missing_layout() {
        let temp = tempfile::tempdir().expect("tempdir");
        write_templates(temp.path(), &[("adem.page.html", QUERY_PAGE)]);
        let err = TemplateCache::build(temp.path()).unwrap_err();
        assert!(format!("{err:#}").contains("adem.page.html"), "{err:#}");
    }

    #[test]
    fn build_fails_on_syntax_error() {
        let temp = tempfile::tempdir().expect("tempdir");
        write_templates(temp.path(), &[("home.page.html", "{% if %}")]);
        assert!(TemplateCache::build(temp.path()).is_err());
    }

    #[test]
    fn build_fails_on_unknown_field() {
        let temp = tempfile::tempdir().expect("tempdir");
        write_templates(temp.path(), &[("home.page.html", "{{ nope }}")]);
        assert!(TemplateCache::build(temp.path()).is_err());
    }

    #[test]
    fn build_fails_without_pages() {
        let temp = tempfile::tempdir().expect("tempdir");
        write_templates(temp.path(), &[("base.layout.html", LAYOUT)]);
        let err = TemplateCache::build(temp.path()).unwrap_err();
        assert!(err.to_string().contains("no *.page.html templates"));
    }

    #[test]
    fn build_fails_on_missing_dir() {
        let temp = tempfile::tempdir().expect("tempdir");
        assert!(TemplateCache::build(&temp.path().join("templates")).is_err());
    }
}
