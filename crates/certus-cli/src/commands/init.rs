use certus_key::Algorithm;
use certus_pki::{CaConfig, CertificateAuthority};
use colored::Colorize;

use super::format_time;
use crate::error::CliResult;

pub fn handle(
    mut config: CaConfig,
    common_name: Option<String>,
    organization: Option<String>,
    country: Option<String>,
    algorithm: Option<String>,
) -> CliResult<()> {
    if let Some(common_name) = common_name {
        config.subject.common_name = common_name;
    }
    if organization.is_some() {
        config.subject.organization = organization;
    }
    if country.is_some() {
        config.subject.country = country;
    }
    if let Some(algorithm) = algorithm {
        config.algorithm = algorithm.parse::<Algorithm>()?;
    }

    println!(
        "{}",
        format!("初始化 CA: {}", config.storage.data_dir.display()).cyan()
    );
    let ca = CertificateAuthority::init(config)?;
    let info = ca.get_ca_info()?;

    println!("{} CA 初始化完成", "✓".green());
    println!();
    println!("{}", "根证书信息:".cyan());
    println!("  主体: {}", info.subject);
    println!("  序列号: {}", info.serial_number);
    println!("  算法: {}", info.algorithm);
    println!("  到期时间: {}", format_time(info.not_after));
    println!();
    println!("{}", "⚠ 注意: 请妥善保管数据目录中的私钥！".yellow().bold());
    Ok(())
}
