//! Call contracts into the rendering side of the platform.
//!
//! The templating engine, facet computation, and price aggregation all live
//! in the embedding application. The daemon only asks it to regenerate
//! things; how that happens is not its business.

use std::path::{Path, PathBuf};
use std::process::Command;

use thiserror::Error;

use crate::config::RendererConfig;

pub trait Renderer {
    /// Regenerate and store the cached rendering for one element.
    fn warm_element(&self, slug: &str) -> Result<(), RenderError>;

    /// Recompute and overwrite the facet/price cache behind one serialized
    /// filter file.
    fn rebuild_filter(&self, instance_id: &str, path: &Path) -> Result<(), RenderError>;
}

#[derive(Debug, Error)]
pub enum RenderError {
    #[error("warmup failed for {slug:?}: {reason}")]
    Element { slug: String, reason: String },
    #[error("filter rebuild failed for {}: {reason}", .path.display())]
    Filter { path: PathBuf, reason: String },
    #[error("no hook command configured for {operation}")]
    NotConfigured { operation: &'static str },
}

/// Renderer that shells out to configured application hook commands.
///
/// `{slug}`, `{instance}`, and `{path}` placeholders in the configured
/// command line are substituted before invocation. A non-zero exit status
/// is a per-item failure, not a daemon error.
#[derive(Debug, Clone)]
pub struct CommandRenderer {
    cfg: RendererConfig,
}

impl CommandRenderer {
    pub fn new(cfg: RendererConfig) -> Self {
        Self { cfg }
    }

    fn run(template: &str, substitutions: &[(&str, &str)]) -> Result<(), String> {
        let mut line = template.to_string();
        for (placeholder, value) in substitutions {
            line = line.replace(placeholder, value);
        }
        let mut parts = line.split_whitespace();
        let program = parts.next().ok_or_else(|| "empty hook command".to_string())?;
        let output = Command::new(program)
            .args(parts)
            .output()
            .map_err(|e| e.to_string())?;
        if output.status.success() {
            Ok(())
        } else {
            let stderr = String::from_utf8_lossy(&output.stderr);
            Err(format!("exit {}: {}", output.status, stderr.trim()))
        }
    }
}

impl Renderer for CommandRenderer {
    fn warm_element(&self, slug: &str) -> Result<(), RenderError> {
        let template = self
            .cfg
            .warm_cmd
            .as_deref()
            .ok_or(RenderError::NotConfigured {
                operation: "warm_element",
            })?;
        Self::run(template, &[("{slug}", slug)]).map_err(|reason| RenderError::Element {
            slug: slug.to_string(),
            reason,
        })
    }

    fn rebuild_filter(&self, instance_id: &str, path: &Path) -> Result<(), RenderError> {
        let template = self
            .cfg
            .filter_cmd
            .as_deref()
            .ok_or(RenderError::NotConfigured {
                operation: "rebuild_filter",
            })?;
        let path_str = path.display().to_string();
        Self::run(template, &[("{instance}", instance_id), ("{path}", &path_str)]).map_err(
            |reason| RenderError::Filter {
                path: path.to_path_buf(),
                reason,
            },
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unconfigured_hooks_fail_cleanly() {
        let renderer = CommandRenderer::new(RendererConfig::default());
        assert!(matches!(
            renderer.warm_element("a"),
            Err(RenderError::NotConfigured { .. })
        ));
        assert!(matches!(
            renderer.rebuild_filter("shop-1", Path::new("/tmp/x")),
            Err(RenderError::NotConfigured { .. })
        ));
    }

    #[test]
    fn hook_substitutes_and_runs() {
        let cfg = RendererConfig {
            warm_cmd: Some("true {slug}".to_string()),
            filter_cmd: Some("false {instance} {path}".to_string()),
        };
        let renderer = CommandRenderer::new(cfg);
        renderer.warm_element("widget-1").expect("true exits 0");
        assert!(matches!(
            renderer.rebuild_filter("shop-1", Path::new("/tmp/x")),
            Err(RenderError::Filter { .. })
        ));
    }
}
