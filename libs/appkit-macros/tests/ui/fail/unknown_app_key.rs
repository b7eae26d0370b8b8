pub struct Model;

#[appkit::app(nmae = "model")]
impl Model {}

fn main() {
    let _ = Model;
}
