use rscdm::pssh::Pssh;

fn main() -> anyhow::Result<()> {
    let input = std::env::args()
        .nth(1)
        .expect("Usage: pssh_inspect <pssh_base64>");

    let pssh = Pssh::from_base64(&input)?;
    println!("version: {}", pssh.version);
    println!("flags: {}", pssh.flags);
    println!("system_id: {}", pssh.system_id);
    println!("init_data: {} bytes", pssh.init_data.len());

    for kid in &pssh.key_ids {
        println!("kid: {}", kid);
    }

    if let Ok(headers) = pssh.wrm_headers() {
        for header in headers {
            println!("wrm_header: {}", header.version()?);
            for kid in header.key_ids()? {
                println!("  kid: {}", kid);
            }
        }
    }

    Ok(())
}
