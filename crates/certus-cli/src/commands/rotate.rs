use certus_pki::{CaConfig, CertificateAuthority};
use colored::Colorize;

use super::format_time;
use crate::error::CliResult;

pub fn handle(config: CaConfig) -> CliResult<()> {
    let ca = CertificateAuthority::open(config)?;
    let previous = ca.get_ca_info()?.serial_number;

    println!("{}", "轮换 CA 根密钥...".cyan());
    let info = ca.rotate()?;

    println!("{} 根密钥已轮换", "✓".green());
    println!("  新根证书序列号: {}", info.serial_number.to_string().bold());
    println!("  到期时间: {}", format_time(info.not_after));
    println!("  旧根证书已退役: {previous}");
    println!();
    println!("{}", "旧根证书签发的证书仍可验证。".green());
    Ok(())
}
