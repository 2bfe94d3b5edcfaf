use artnet_client::{Client, Config};
use std::time::Duration;

#[tokio::main]
async fn main() {
    let client = Client::new(Config::default()).expect("could not resolve a network interface");
    let universe = client
        .set_port_config("0:0:1", true, false)
        .expect("valid port address");

    let fader = universe.clone();
    tokio::spawn(async move {
        let mut level = 0u8;
        loop {
            fader
                .set_dmx(&[level, 255 - level, 128])
                .expect("universe is configured");
            level = level.wrapping_add(8);
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
    });

    client.connect().await.expect("transport failed");
}
