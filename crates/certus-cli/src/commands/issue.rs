use std::{fs, path::PathBuf};

use certus_pki::{CaConfig, CertificateAuthority, CertificateRequest};
use colored::Colorize;

use super::print_certificate;
use crate::error::CliResult;

pub fn handle(
    config: CaConfig,
    request: CertificateRequest,
    output: Option<PathBuf>,
) -> CliResult<()> {
    println!("{}", format!("签发证书: {}", request.subject.common_name).cyan());

    let ca = CertificateAuthority::open(config)?;
    let cert = ca.issue_certificate(&request)?;

    println!("{} 证书签发成功", "✓".green());
    println!();
    print_certificate(&cert);

    if let Some(output) = output {
        fs::write(&output, cert.to_pem())?;
        println!();
        println!("{} 证书已保存到: {}", "✓".green(), output.display());
    }
    Ok(())
}
