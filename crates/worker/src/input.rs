//! Job input validation and default-workflow substitution.

use serde_json::Value;

use crate::workflow::{default_workflow, LOAD_IMAGE_NODE_ID};

/// Validation failures.  All of them are terminal before any engine
/// contact is made.
#[derive(Debug, thiserror::Error)]
pub enum InputError {
    #[error("Please provide input")]
    Missing,

    #[error("Invalid JSON format in input")]
    Unparseable,

    #[error("'images' must be a list of objects with 'name' and 'image' keys")]
    MalformedImages,
}

/// One input image: upload name plus base64 payload (optionally
/// data-URI prefixed).
#[derive(Debug, Clone)]
pub struct InputImage {
    pub name: String,
    pub image: String,
}

/// Normalized job input ready for the pipeline.
#[derive(Debug)]
pub struct ValidatedInput {
    /// The workflow graph to queue; the caller's own graph, or a
    /// fresh copy of the default template.
    pub workflow: Value,
    /// Input images to upload before submission; may be empty.
    pub images: Vec<InputImage>,
}

/// Validate raw job input.
///
/// Accepts either a JSON object or a string holding one (a single
/// parse is applied).  When no workflow is supplied the built-in
/// default is deep-copied in, and -- if at least one input image is
/// present -- its `LoadImage` node is rewired to the first image's
/// name.  Later images are uploaded but not wired in automatically.
pub fn validate_input(raw: Option<&Value>) -> Result<ValidatedInput, InputError> {
    let raw = match raw {
        None | Some(Value::Null) => return Err(InputError::Missing),
        Some(value) => value,
    };

    let parsed: Value = match raw {
        Value::String(text) => serde_json::from_str(text).map_err(|_| InputError::Unparseable)?,
        other => other.clone(),
    };

    let (mut workflow, used_default) = match parsed.get("workflow") {
        Some(workflow) => (workflow.clone(), false),
        None => {
            tracing::info!("No workflow provided, using default generation workflow");
            (default_workflow(), true)
        }
    };

    let images = parse_images(parsed.get("images"))?;

    if used_default {
        if let Some(first) = images.first() {
            bind_input_image(&mut workflow, &first.name);
        }
    }

    Ok(ValidatedInput { workflow, images })
}

/// Parse and validate the optional `images` field.
fn parse_images(value: Option<&Value>) -> Result<Vec<InputImage>, InputError> {
    let entries = match value {
        None | Some(Value::Null) => return Ok(Vec::new()),
        Some(Value::Array(entries)) => entries,
        Some(_) => return Err(InputError::MalformedImages),
    };

    entries
        .iter()
        .map(|entry| {
            let name = entry.get("name").and_then(Value::as_str);
            let image = entry.get("image").and_then(Value::as_str);
            match (name, image) {
                (Some(name), Some(image)) => Ok(InputImage {
                    name: name.to_string(),
                    image: image.to_string(),
                }),
                _ => Err(InputError::MalformedImages),
            }
        })
        .collect()
}

/// Point the default workflow's `LoadImage` node at the uploaded
/// image.  A template without that node is left untouched.
fn bind_input_image(workflow: &mut Value, image_name: &str) {
    if let Some(inputs) = workflow
        .get_mut(LOAD_IMAGE_NODE_ID)
        .and_then(|node| node.get_mut("inputs"))
        .and_then(Value::as_object_mut)
    {
        inputs.insert("image".to_string(), Value::String(image_name.to_string()));
        tracing::info!(image = %image_name, "Bound default workflow to input image");
    }
}
