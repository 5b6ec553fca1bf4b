pub mod check_cert;
pub mod info;
pub mod init;
pub mod issue;
pub mod issue_csr;
pub mod list;
pub mod revoke;
pub mod rotate;
pub mod show;
pub mod sign;
pub mod verify;

use std::{fs, path::Path};

use certus_pki::{Certificate, CertificateStatus, VerificationResult};
use colored::{ColoredString, Colorize};
use time::{format_description::well_known::Rfc3339, OffsetDateTime};

use crate::error::{CliError, CliResult};

/// Read a text file, reporting a missing path as `FileNotFound`
pub(crate) fn read_text(path: &Path) -> CliResult<String> {
    if !path.exists() {
        return Err(CliError::FileNotFound(path.display().to_string()));
    }
    Ok(fs::read_to_string(path)?)
}

pub(crate) fn format_time(t: OffsetDateTime) -> String {
    t.format(&Rfc3339).unwrap_or_else(|_| t.to_string())
}

pub(crate) fn status_label(status: &CertificateStatus) -> ColoredString {
    match status {
        CertificateStatus::Active => "有效".green(),
        CertificateStatus::Revoked { .. } => "已撤销".red(),
        CertificateStatus::Expired { .. } => "已过期".yellow(),
    }
}

pub(crate) fn print_certificate(cert: &Certificate) {
    println!("  序列号: {}", cert.serial_number.to_string().bold());
    println!("  主体: {}", cert.subject);
    println!("  颁发者: {}", cert.issuer);
    println!("  生效时间: {}", format_time(cert.not_before));
    println!("  到期时间: {}", format_time(cert.not_after));
    println!("  签名算法: {}", cert.signature_algorithm);
    println!("  公钥算法: {}", cert.public_key_algorithm.key_algorithm_name());
    if !cert.subject_alt_names.is_empty() {
        let names: Vec<String> = cert.subject_alt_names.iter().map(ToString::to_string).collect();
        println!("  备用名称: {}", names.join(", "));
    }
    println!("  指纹 (SHA-256): {}", cert.thumbprint());
}

pub(crate) fn print_verification(result: &VerificationResult) {
    if result.valid {
        println!("{} {}", "✓".green(), "验证通过！".green().bold());
    } else {
        println!("{} {}", "✗".red(), "验证失败！".red().bold());
        for reason in &result.reasons {
            println!("  - {}", reason.to_string().red());
        }
    }
    println!();
    println!("{}", "验证详情:".cyan());
    println!("  证书序列号: {}", result.signer_certificate_serial);
    println!("  证书链: {}", if result.chain_valid { "有效".green() } else { "无效".red() });
    println!(
        "  撤销检查: {}",
        if result.revocation_checked { "已检查".green() } else { "未检查".yellow() }
    );
}
