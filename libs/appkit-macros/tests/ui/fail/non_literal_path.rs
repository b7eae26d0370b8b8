pub struct Model;

#[appkit::app]
impl Model {
    #[endpoint(path = PATH)]
    fn run(&self, input: String) -> String {
        input
    }
}

fn main() {
    let _ = Model;
}
