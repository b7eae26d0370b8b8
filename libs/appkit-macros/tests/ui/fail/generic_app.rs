pub struct Wrapper<T>(T);

#[appkit::app]
impl<T> Wrapper<T> {}

fn main() {
    let _ = Wrapper(0u8).0;
}
