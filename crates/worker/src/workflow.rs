//! Built-in default workflow graph.
//!
//! Used when a job supplies no `workflow` of its own: an
//! image-to-image graph that loads the first uploaded input image,
//! re-samples it against the checkpoint, and saves the result.  The
//! template is parsed once and deep-cloned per job -- callers may
//! mutate their copy freely without contaminating later jobs.

use std::sync::OnceLock;

use serde_json::Value;

/// Node id of the `LoadImage` node that
/// [`validate_input`](crate::input::validate_input) rewires to the
/// first uploaded input image.
pub const LOAD_IMAGE_NODE_ID: &str = "10";

static TEMPLATE: OnceLock<Value> = OnceLock::new();

/// A fresh deep copy of the default workflow graph.
pub fn default_workflow() -> Value {
    TEMPLATE
        .get_or_init(|| {
            serde_json::from_str(DEFAULT_WORKFLOW_JSON)
                .expect("built-in default workflow is valid JSON")
        })
        .clone()
}

const DEFAULT_WORKFLOW_JSON: &str = r#"{
  "1": {
    "inputs": {
      "ckpt_name": "sd_xl_base_1.0.safetensors"
    },
    "class_type": "CheckpointLoaderSimple",
    "_meta": {
      "title": "Load Checkpoint"
    }
  },
  "2": {
    "inputs": {
      "text": "high detail photograph, natural lighting, sharp focus, realistic skin texture",
      "clip": [
        "1",
        1
      ]
    },
    "class_type": "CLIPTextEncode",
    "_meta": {
      "title": "Positive Prompt"
    }
  },
  "3": {
    "inputs": {
      "text": "blurry, low quality, jpeg artifacts, watermark, text, deformed hands, extra fingers, bad anatomy",
      "clip": [
        "1",
        1
      ]
    },
    "class_type": "CLIPTextEncode",
    "_meta": {
      "title": "Negative Prompt"
    }
  },
  "10": {
    "inputs": {
      "image": "input_image.png"
    },
    "class_type": "LoadImage",
    "_meta": {
      "title": "Load Input Image"
    }
  },
  "11": {
    "inputs": {
      "pixels": [
        "10",
        0
      ],
      "vae": [
        "1",
        2
      ]
    },
    "class_type": "VAEEncode",
    "_meta": {
      "title": "VAE Encode"
    }
  },
  "12": {
    "inputs": {
      "seed": -1,
      "steps": 20,
      "cfg": 7.0,
      "sampler_name": "euler",
      "scheduler": "normal",
      "denoise": 0.6,
      "model": [
        "1",
        0
      ],
      "positive": [
        "2",
        0
      ],
      "negative": [
        "3",
        0
      ],
      "latent_image": [
        "11",
        0
      ]
    },
    "class_type": "KSampler",
    "_meta": {
      "title": "KSampler"
    }
  },
  "13": {
    "inputs": {
      "samples": [
        "12",
        0
      ],
      "vae": [
        "1",
        2
      ]
    },
    "class_type": "VAEDecode",
    "_meta": {
      "title": "VAE Decode"
    }
  },
  "14": {
    "inputs": {
      "filename_prefix": "kiln/%date:yyyy-MM-dd%",
      "images": [
        "13",
        0
      ]
    },
    "class_type": "SaveImage",
    "_meta": {
      "title": "Save Image"
    }
  }
}"#;
