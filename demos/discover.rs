use artnet_client::{Client, Config};
use std::time::Duration;

#[tokio::main]
async fn main() {
    let client = Client::new(Config::default()).expect("could not resolve a network interface");
    println!("local address {}", client.interface().ip);

    let watcher = client.clone();
    tokio::spawn(async move {
        loop {
            tokio::time::sleep(Duration::from_secs(5)).await;
            for node in watcher.list_nodes() {
                println!(
                    "node {} #{} {:?} ({} ports)",
                    node.id.ip,
                    node.id.bind_index,
                    node.short_name,
                    node.ports.len()
                );
            }
            for universe in watcher.list_universes() {
                println!(
                    "universe {}: {} publishers, {} subscribers",
                    universe.address,
                    universe.publishers.len(),
                    universe.subscribers.len()
                );
            }
        }
    });

    client.connect().await.expect("transport failed");
}
