pub struct Model;

#[appkit::app(name = "a", name = "b")]
impl Model {}

fn main() {
    let _ = Model;
}
