use std::sync::Mutex;

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

#[derive(Deserialize, ToSchema)]
pub struct Image {
    pixels: Vec<u8>,
}

#[derive(Serialize, ToSchema)]
pub struct Labels {
    labels: Vec<String>,
}

#[derive(Default)]
pub struct Classifier {
    weights: Mutex<Vec<f32>>,
}

#[appkit::app(name = "classifier", requirements = ["onnxruntime>=1.17"])]
impl Classifier {
    fn setup(&mut self) -> anyhow::Result<()> {
        *self.weights.get_mut().unwrap() = vec![0.5; 4];
        Ok(())
    }

    fn download_weights(&self) {}

    #[appkit::endpoint(path = "/v1/classify")]
    fn classify(&self, input: Image) -> anyhow::Result<Labels> {
        let weights = self.weights.lock().unwrap();
        Ok(Labels {
            labels: vec![format!("{} px, {} weights", input.pixels.len(), weights.len())],
        })
    }

    #[endpoint]
    fn r#match(&self, input: Image) -> Labels {
        Labels {
            labels: vec![input.pixels.len().to_string()],
        }
    }
}

fn main() {}
