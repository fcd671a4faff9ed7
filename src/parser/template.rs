use handlebars::Handlebars;
use serde::Serialize;
use thiserror::Error;

const TEMPLATE_NAME: &str = "message";

#[derive(Error, Debug)]
pub enum RenderError {
    #[error("Invalid template: {source}")]
    Template {
        #[source]
        source: Box<handlebars::TemplateError>,
    },
    #[error("Template rendering failed: {source}")]
    Render {
        #[source]
        source: handlebars::RenderError,
    },
}

/// A compiled handlebars template.
///
/// Output is not HTML-escaped, and referencing a field the data does not
/// have is an error rather than an empty string.
#[derive(Debug, Clone)]
pub struct MessageTemplate {
    source: String,
    registry: Handlebars<'static>,
}

impl MessageTemplate {
    pub fn compile(source: &str) -> Result<Self, RenderError> {
        let mut registry = Handlebars::new();
        registry.register_escape_fn(handlebars::no_escape);
        registry.set_strict_mode(true);
        registry
            .register_template_string(TEMPLATE_NAME, source)
            .map_err(|e| RenderError::Template {
                source: Box::new(e),
            })?;
        Ok(Self {
            source: source.to_string(),
            registry,
        })
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    /// Renders `data` into `out`, replacing its previous contents.
    pub fn render<T: Serialize>(&self, data: &T, out: &mut String) -> Result<(), RenderError> {
        let rendered = self
            .registry
            .render(TEMPLATE_NAME, data)
            .map_err(|e| RenderError::Render { source: e })?;
        out.clear();
        out.push_str(&rendered);
        Ok(())
    }

    pub fn render_to_string<T: Serialize>(&self, data: &T) -> Result<String, RenderError> {
        let mut out = String::new();
        self.render(data, &mut out)?;
        Ok(out)
    }
}
