use appkit::App;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

#[derive(Deserialize, ToSchema)]
pub struct Prompt {
    text: String,
}

#[derive(Serialize, ToSchema)]
pub struct Reply {
    text: String,
}

#[derive(Default)]
pub struct Echo;

#[appkit::app]
impl Echo {
    #[endpoint]
    fn echo(&self, input: Prompt) -> Reply {
        Reply { text: input.text }
    }
}

fn main() {
    let registry = appkit::Registry::new();
    Echo::register(&registry).unwrap();
}
