use certus_pki::{CaConfig, CertificateAuthority};
use colored::Colorize;

use super::{format_time, status_label};
use crate::error::CliResult;

pub fn handle(config: CaConfig, json: bool) -> CliResult<()> {
    let ca = CertificateAuthority::open(config)?;
    let info = ca.get_ca_info()?;

    if json {
        println!("{}", serde_json::to_string_pretty(&info)?);
        return Ok(());
    }

    println!("{}", "CA 信息".cyan().bold());
    println!();
    println!("  主体: {}", info.subject);
    println!("  颁发者: {}", info.issuer);
    println!("  序列号: {}", info.serial_number);
    println!("  生效时间: {}", format_time(info.not_before));
    println!("  到期时间: {}", format_time(info.not_after));
    println!("  算法: {}", info.algorithm);
    println!("  状态: {}", status_label(&info.status));
    println!("  指纹 (SHA-256): {}", info.thumbprint);
    if !info.retired_roots.is_empty() {
        let serials: Vec<String> = info.retired_roots.iter().map(ToString::to_string).collect();
        println!("  已退役根证书: {}", serials.join(", "));
    }
    println!("  已签发证书: {}", ca.registry().len()?);
    Ok(())
}
