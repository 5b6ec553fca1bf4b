use certus_pki::{CaConfig, CertificateAuthority, CertificateStatus};
use colored::Colorize;

use super::{format_time, print_certificate, status_label};
use crate::error::CliResult;

pub fn handle(config: CaConfig, serial: String, pem: bool) -> CliResult<()> {
    let ca = CertificateAuthority::open(config)?;
    let details = ca.get_certificate_by_serial(&serial)?;

    if pem {
        print!("{}", details.certificate.to_pem());
        return Ok(());
    }

    println!("{}", "证书详情".cyan().bold());
    println!();
    print_certificate(&details.certificate);
    println!("  状态: {}", status_label(&details.status));
    if let CertificateStatus::Revoked { reason, revoked_at } = &details.status {
        println!("  撤销原因: {}", reason.as_str());
        println!("  撤销时间: {}", format_time(*revoked_at));
    }
    Ok(())
}
