use std::{fs, path::PathBuf};

use certus_pki::{CaConfig, CertificateAuthority, Csr};
use colored::Colorize;

use super::{print_certificate, read_text};
use crate::error::CliResult;

pub fn handle(
    config: CaConfig,
    csr: PathBuf,
    days: Option<u32>,
    output: Option<PathBuf>,
) -> CliResult<()> {
    println!("{}", format!("处理证书请求: {}", csr.display()).cyan());

    let pem = read_text(&csr)?;
    let summary = Csr::from_pem(&pem)?.summary()?;
    println!("  请求主体: {}", summary.subject);
    println!("  公钥算法: {}", summary.algorithm.key_algorithm_name());

    let ca = CertificateAuthority::open(config)?;
    let cert = ca.issue_from_csr(&pem, days)?;

    println!("{} 证书签发成功", "✓".green());
    println!();
    print_certificate(&cert);
    println!();
    println!("{}", "注意: 私钥由申请者持有，CA 无法使用该证书签名。".yellow());

    let output = output.unwrap_or_else(|| PathBuf::from(format!("{}.pem", cert.serial_number)));
    fs::write(&output, cert.to_pem())?;
    println!("{} 证书已保存到: {}", "✓".green(), output.display());
    Ok(())
}
