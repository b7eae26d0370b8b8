pub struct Model;

#[appkit::app]
impl Model {
    #[endpoint]
    async fn run(&self, input: String) -> String {
        input
    }
}

fn main() {
    let _ = Model;
}
