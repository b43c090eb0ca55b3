use anyhow::{bail, Context, Result};
use doc_model::{FieldStore, Rect, SignatureContent, SignatureKind, SignerConfig};
use serde::Deserialize;
use std::fs;
use std::path::Path;

/// JSON list of fields to place, in viewport pixels.
#[derive(Debug, Deserialize)]
pub struct Manifest {
    pub fields: Vec<FieldSpec>,
}

#[derive(Debug, Deserialize)]
pub struct FieldSpec {
    #[serde(default = "first_page")]
    pub page: u32,
    pub x: f64,
    pub y: f64,
    pub width: Option<f64>,
    pub height: Option<f64>,
    pub kind: SignatureKind,
    pub text: Option<String>,
    /// `data:image/...;base64,` URL or a path relative to the manifest.
    pub image: Option<String>,
}

fn first_page() -> u32 {
    1
}

impl Manifest {
    pub fn load(path: &Path) -> Result<Self> {
        let bytes = fs::read(path)
            .with_context(|| format!("failed to read field manifest {}", path.display()))?;
        serde_json::from_slice(&bytes)
            .with_context(|| format!("invalid field manifest {}", path.display()))
    }

    /// Creates every field in `store`, filled where the manifest has content.
    pub fn place(
        &self,
        base_dir: &Path,
        config: &SignerConfig,
        store: &mut FieldStore,
    ) -> Result<usize> {
        let (default_width, default_height) = config.field_size();

        for (index, entry) in self.fields.iter().enumerate() {
            let geometry = Rect::new(
                entry.x,
                entry.y,
                entry.width.unwrap_or(default_width),
                entry.height.unwrap_or(default_height),
            );
            let id = store.create(entry.kind, entry.page, geometry);

            let content = entry
                .content(base_dir, config)
                .with_context(|| format!("field #{} in manifest", index + 1))?;
            if let Some(content) = content {
                store.set_content(id, content);
            }
        }

        Ok(self.fields.len())
    }
}

impl FieldSpec {
    fn content(&self, base_dir: &Path, config: &SignerConfig) -> Result<Option<SignatureContent>> {
        match self.kind {
            SignatureKind::Type => {
                let text = self.text.clone().unwrap_or_else(|| config.profile.name.clone());
                Ok((!text.trim().is_empty()).then_some(SignatureContent::Type { text }))
            }
            SignatureKind::Draw | SignatureKind::Image => {
                let Some(source) = self.image.as_deref() else {
                    return Ok(None);
                };
                if source.starts_with("data:") {
                    return Ok(Some(SignatureContent::from_data_url(self.kind, source)?));
                }

                let path = base_dir.join(source);
                let image = fs::read(&path)
                    .with_context(|| format!("failed to read image {}", path.display()))?;
                Ok(Some(match self.kind {
                    SignatureKind::Draw => SignatureContent::Draw { image },
                    _ => SignatureContent::Image { image },
                }))
            }
        }
    }
}

/// Parses `WIDTHxHEIGHT`.
pub fn parse_size(value: &str) -> Result<(f64, f64)> {
    let Some((width, height)) = value.split_once(['x', 'X']) else {
        bail!("expected WIDTHxHEIGHT, got {value:?}");
    };
    let width: f64 = width.trim().parse().with_context(|| format!("invalid width in {value:?}"))?;
    let height: f64 =
        height.trim().parse().with_context(|| format!("invalid height in {value:?}"))?;
    if !(width > 0.0 && height > 0.0) {
        bail!("size must be positive, got {value:?}");
    }
    Ok((width, height))
}
