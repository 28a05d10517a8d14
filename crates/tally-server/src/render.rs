//! HTML rendering via `minijinja`.
//!
//! Both templates are compiled into the binary. `counter.html` is the
//! fragment swapped in by HTMX (and carried by every event frame);
//! `page.html` is the full document wrapping it, with the HTMX SSE
//! extension connected to `/sse`.

use minijinja::{context, Environment};
use tally_core::{Render, RenderError};

use crate::error::ServerError;

const COUNTER_TEMPLATE: &str = "counter.html";
const PAGE_TEMPLATE: &str = "page.html";
const PAGE_TITLE: &str = "Tally Live Counter";

/// Renders the counter fragment and the full page.
#[derive(Debug)]
pub struct HtmlRenderer {
    env: Environment<'static>,
}

impl HtmlRenderer {
    /// Create a renderer with the built-in templates loaded.
    pub fn new() -> Result<Self, ServerError> {
        let mut env = Environment::new();
        env.add_template(COUNTER_TEMPLATE, include_str!("templates/counter.html"))
            .map_err(|e| ServerError::Template(format!("failed to add counter template: {e}")))?;
        env.add_template(PAGE_TEMPLATE, include_str!("templates/page.html"))
            .map_err(|e| ServerError::Template(format!("failed to add page template: {e}")))?;
        Ok(Self { env })
    }

    /// The counter fragment for `value`. Always a single line.
    pub fn counter_fragment(&self, value: u64) -> Result<String, RenderError> {
        self.render_template(COUNTER_TEMPLATE, value)
    }

    /// The full HTML document showing `value`.
    pub fn page(&self, value: u64) -> Result<String, RenderError> {
        self.render_template(PAGE_TEMPLATE, value)
    }

    fn render_template(&self, name: &str, value: u64) -> Result<String, RenderError> {
        self.env
            .get_template(name)
            .and_then(|tpl| tpl.render(context! { value, title => PAGE_TITLE }))
            .map_err(|e| RenderError(format!("{name}: {e}")))
    }
}

impl Render for HtmlRenderer {
    fn render(&self, value: u64) -> Result<String, RenderError> {
        self.counter_fragment(value)
    }
}
