//! Message body templates.

use crate::config::MailFormat;
use crate::row::Row;
use minijinja::{AutoEscape, Environment};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;

/// Template loading and rendering errors.
#[derive(Debug, Error)]
pub enum TemplateError {
    /// No template file configured.
    #[error("template file(s) not specified")]
    NoFiles,

    /// A template file could not be read.
    #[error("cannot read template {}: {source}", path.display())]
    Read {
        /// Template file.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// Syntax or rendering error reported by the engine.
    #[error(transparent)]
    Engine(#[from] minijinja::Error),
}

/// Renders a message body for a row.
pub trait Executor {
    /// Appends the rendered body for `row` to `out`.
    ///
    /// # Errors
    ///
    /// Returns an error if rendering fails.
    fn execute(&self, out: &mut String, row: &Row) -> Result<(), TemplateError>;
}

impl<F> Executor for F
where
    F: Fn(&mut String, &Row) -> Result<(), TemplateError>,
{
    fn execute(&self, out: &mut String, row: &Row) -> Result<(), TemplateError> {
        self(out, row)
    }
}

/// Jinja-style templates; row fields are top-level variables.
///
/// ```text
/// Dear {{ name }},
/// {% if balance %}Your balance is {{ balance }}.{% endif %}
/// ```
#[derive(Debug)]
pub struct Templates {
    env: Environment<'static>,
    name: String,
}

impl Templates {
    /// Loads template files, each registered under its file name.
    ///
    /// The template rendered is `name` if such a file exists, otherwise the
    /// first file.
    ///
    /// # Errors
    ///
    /// Returns an error if no file is given, a file cannot be read, or a
    /// template does not parse.
    pub fn from_files<P: AsRef<Path>>(
        format: MailFormat,
        name: &str,
        files: &[P],
    ) -> Result<Self, TemplateError> {
        let mut sources = Vec::with_capacity(files.len());
        for path in files {
            let path = path.as_ref();
            let source = std::fs::read_to_string(path).map_err(|source| TemplateError::Read {
                path: path.to_path_buf(),
                source,
            })?;
            let file_name = path
                .file_name()
                .map_or_else(|| path.display().to_string(), |n| n.to_string_lossy().into_owned());
            sources.push((file_name, source));
        }
        Self::from_sources(format, name, sources)
    }

    /// Builds templates from `(name, source)` pairs.
    ///
    /// # Errors
    ///
    /// Returns an error if `sources` is empty or a template does not parse.
    pub fn from_sources(
        format: MailFormat,
        name: &str,
        sources: Vec<(String, String)>,
    ) -> Result<Self, TemplateError> {
        let first = sources
            .first()
            .map(|(n, _)| n.clone())
            .ok_or(TemplateError::NoFiles)?;
        let selected = if sources.iter().any(|(n, _)| n == name) {
            name.to_string()
        } else {
            first
        };

        let mut env = Environment::new();
        env.set_auto_escape_callback(move |_| match format {
            MailFormat::Html => AutoEscape::Html,
            MailFormat::Plain => AutoEscape::None,
        });
        for (template_name, source) in sources {
            env.add_template_owned(template_name, source)?;
        }

        debug!(template = %selected, ?format, "templates loaded");
        Ok(Self {
            env,
            name: selected,
        })
    }

    /// Name of the template that is rendered.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl Executor for Templates {
    fn execute(&self, out: &mut String, row: &Row) -> Result<(), TemplateError> {
        let template = self.env.get_template(&self.name)?;
        out.push_str(&template.render(row)?);
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::row::Value;

    fn row() -> Row {
        Row::from_iter([
            ("name", Value::from("<Jane>")),
            ("balance", Value::from(12_i64)),
        ])
    }

    fn render(templates: &Templates) -> String {
        let mut out = String::new();
        templates.execute(&mut out, &row()).unwrap();
        out
    }

    #[test]
    fn test_plain_does_not_escape() {
        let templates = Templates::from_sources(
            MailFormat::Plain,
            "mailmerge",
            vec![("letter.txt".into(), "Dear {{ name }}, you owe {{ balance }}.".into())],
        )
        .unwrap();
        assert_eq!(render(&templates), "Dear <Jane>, you owe 12.");
    }

    #[test]
    fn test_html_escapes() {
        let templates = Templates::from_sources(
            MailFormat::Html,
            "mailmerge",
            vec![("letter.txt".into(), "<p>{{ name }}</p>".into())],
        )
        .unwrap();
        assert_eq!(render(&templates), "<p>&lt;Jane&gt;</p>");
    }

    #[test]
    fn test_named_template_is_selected() {
        let templates = Templates::from_sources(
            MailFormat::Plain,
            "body.txt",
            vec![
                ("header.txt".into(), "Header".into()),
                ("body.txt".into(), "{% include 'header.txt' %} for {{ name }}".into()),
            ],
        )
        .unwrap();
        assert_eq!(templates.name(), "body.txt");
        assert_eq!(render(&templates), "Header for <Jane>");
    }

    #[test]
    fn test_falls_back_to_first() {
        let templates = Templates::from_sources(
            MailFormat::Plain,
            "mailmerge",
            vec![("a.txt".into(), "A".into()), ("b.txt".into(), "B".into())],
        )
        .unwrap();
        assert_eq!(templates.name(), "a.txt");
    }

    #[test]
    fn test_errors() {
        assert!(matches!(
            Templates::from_sources(MailFormat::Plain, "x", Vec::new()),
            Err(TemplateError::NoFiles)
        ));
        assert!(matches!(
            Templates::from_sources(
                MailFormat::Plain,
                "x",
                vec![("bad.txt".into(), "{% if %}".into())]
            ),
            Err(TemplateError::Engine(_))
        ));
        assert!(matches!(
            Templates::from_files(MailFormat::Plain, "x", &["/no/such/template.txt"]),
            Err(TemplateError::Read { .. })
        ));
    }

    #[test]
    fn test_from_files() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mailmerge");
        std::fs::write(&path, "Hi {{ name }}").unwrap();
        let templates = Templates::from_files(MailFormat::Plain, "mailmerge", &[&path]).unwrap();
        assert_eq!(render(&templates), "Hi <Jane>");
    }
}
