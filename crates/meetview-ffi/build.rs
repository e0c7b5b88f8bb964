fn main() {
    uniffi::generate_scaffolding("src/meetview.udl").unwrap();
}
