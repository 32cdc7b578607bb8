#[tokio::main]
async fn main() {
    schedule_editor_lib::run().await
}
