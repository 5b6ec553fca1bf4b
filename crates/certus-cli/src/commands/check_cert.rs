use std::path::PathBuf;

use certus_pki::{CaConfig, CertificateAuthority};
use colored::Colorize;

use super::{print_verification, read_text};
use crate::error::CliResult;

pub fn handle(config: CaConfig, cert: PathBuf) -> CliResult<()> {
    println!("{}", format!("检查证书: {}", cert.display()).cyan());

    let pem = read_text(&cert)?;
    let ca = CertificateAuthority::open(config)?;
    let result = ca.verify_presented_certificate(&pem)?;

    print_verification(&result);
    if !result.valid {
        std::process::exit(2);
    }
    Ok(())
}
