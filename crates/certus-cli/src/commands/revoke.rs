use certus_pki::{CaConfig, CertificateAuthority, RevocationReason};
use colored::Colorize;

use super::format_time;
use crate::error::CliResult;

pub fn handle(config: CaConfig, serial: String, reason: String) -> CliResult<()> {
    let reason: RevocationReason = reason.parse()?;
    let ca = CertificateAuthority::open(config)?;
    let entry = ca.revoke_certificate(&serial, reason)?;

    println!("{} 证书已撤销: {}", "✓".green(), entry.serial_number);
    println!("  撤销原因: {}", entry.reason.as_str());
    println!("  撤销时间: {}", format_time(entry.revoked_at));
    Ok(())
}
