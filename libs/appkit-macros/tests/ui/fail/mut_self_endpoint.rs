pub struct Model;

#[appkit::app]
impl Model {
    #[endpoint]
    fn run(&mut self, input: String) -> String {
        input
    }
}

fn main() {
    let _ = Model;
}
