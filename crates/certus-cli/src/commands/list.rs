use certus_pki::{CaConfig, CertificateAuthority};
use colored::Colorize;

use super::{format_time, status_label};
use crate::error::CliResult;

pub fn handle(config: CaConfig, all: bool) -> CliResult<()> {
    let ca = CertificateAuthority::open(config)?;
    let certificates = ca.list_certificates()?;
    let shown: Vec<_> = certificates
        .iter()
        .filter(|details| all || details.status.is_active())
        .collect();

    if shown.is_empty() {
        println!("{}", "没有证书".yellow());
        return Ok(());
    }

    println!("{}", format!("证书列表 ({})", shown.len()).cyan().bold());
    for details in shown {
        let cert = &details.certificate;
        println!(
            "  {}  {}  {}  {}",
            cert.serial_number.to_string().bold(),
            status_label(&details.status),
            format_time(cert.not_after),
            cert.subject.common_name
        );
    }
    Ok(())
}
