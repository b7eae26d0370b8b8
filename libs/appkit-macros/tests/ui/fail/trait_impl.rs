pub struct Model;

#[appkit::app]
impl Default for Model {
    fn default() -> Self {
        Model
    }
}

fn main() {
    let _ = Model;
}
