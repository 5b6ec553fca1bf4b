use std::{fs::File, path::PathBuf};

use certus_pki::{CaConfig, CertificateAuthority, SignatureRecord};
use colored::Colorize;

use super::{format_time, print_verification, read_text};
use crate::error::{CliError, CliResult};

pub fn handle(config: CaConfig, file: PathBuf, signature: PathBuf) -> CliResult<()> {
    println!("{}", format!("验证文件签名: {}", file.display()).cyan());

    if !file.exists() {
        return Err(CliError::FileNotFound(file.display().to_string()));
    }
    let record = SignatureRecord::from_json(&read_text(&signature)?)?;

    let ca = CertificateAuthority::open(config)?;
    println!("{}", "验证签名...".cyan());
    let result = ca.validate_signature_reader(&record, File::open(&file)?, None)?;

    print_verification(&result);
    println!("  签名时间: {}", format_time(record.signed_at));
    if let Some(reason) = &record.reason {
        println!("  签名原因: {reason}");
    }

    if !result.valid {
        std::process::exit(2);
    }
    Ok(())
}
