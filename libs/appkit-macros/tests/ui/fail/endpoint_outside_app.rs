#[appkit::endpoint]
fn run() {}

fn main() {
    run();
}
