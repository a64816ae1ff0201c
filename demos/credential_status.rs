use std::path::Path;

use rscdm::cdm::NoPlayReady;
use rscdm::context::CredentialContext;

fn main() -> anyhow::Result<()> {
    let dir = std::env::args().nth(1).unwrap_or_else(|| ".".to_string());

    let context = CredentialContext::load(Path::new(&dir), &NoPlayReady);
    match context.active_scheme() {
        Some(scheme) => println!("scheme: {}", scheme),
        None => println!("scheme: <none>"),
    }
    println!("can_decrypt: {}", context.can_decrypt());
    if let Err(e) = context.widevine() {
        println!("widevine: {}", e);
    }

    Ok(())
}
