#[cfg(feature = "pcsc")]
pub mod poll;
pub mod preprocess;

use clap::{Args, ValueEnum};
use emv_common::{parse_tlvs, Tlv};
use emv_entry_point::{CardAppConfiguration, CardApplication, Currency, KernelType, TransactionType};

#[derive(Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum TxType {
    Purchase,
    Cash,
    Cashback,
    Refund,
}

impl From<TxType> for TransactionType {
    fn from(t: TxType) -> Self {
        match t {
            TxType::Purchase => TransactionType::Purchase,
            TxType::Cash => TransactionType::Cash,
            TxType::Cashback => TransactionType::Cashback,
            TxType::Refund => TransactionType::Refund,
        }
    }
}

/// A configured application given as `AID:KERNEL-ID[:HEX-TLV]`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppArg {
    pub aid: String,
    pub kernel_type: KernelType,
    pub config: Vec<Tlv>,
}

pub fn parse_app(s: &str) -> Result<AppArg, String> {
    let mut parts = s.splitn(3, ':');
    let aid = parts.next().unwrap_or_default().to_uppercase();
    let aid_bytes = hex::decode(&aid).map_err(|e| format!("invalid AID {}: {}", aid, e))?;
    if !(5..=16).contains(&aid_bytes.len()) {
        return Err(format!("AID {} must be 5 to 16 bytes", aid));
    }

    let kernel_id = parts.next().ok_or("missing kernel id")?;
    let kernel_type = kernel_id
        .parse::<u8>()
        .ok()
        .and_then(KernelType::from_id)
        .ok_or_else(|| format!("unknown kernel id {}", kernel_id))?;

    let config = match parts.next() {
        Some(data) if !data.is_empty() => {
            let bytes = hex::decode(data).map_err(|e| format!("invalid TLV hex: {}", e))?;
            parse_tlvs(&bytes).map_err(|e| e.to_string())?
        }
        _ => Vec::new(),
    };

    Ok(AppArg {
        aid,
        kernel_type,
        config,
    })
}

/// Transaction and application arguments shared by the commands
#[derive(Args)]
pub struct TransactionArgs {
    /// Amount authorised, in minor units
    #[arg(long)]
    pub amount: i64,

    /// Amount other (cashback), in minor units
    #[arg(long, default_value_t = 0)]
    pub other: i64,

    /// ISO 4217 numeric currency code
    #[arg(long, default_value_t = 978)]
    pub currency: u16,

    /// Currency exponent
    #[arg(long, default_value_t = 2, value_parser = clap::value_parser!(u8).range(0..=18))]
    pub exponent: u8,

    #[arg(long = "type", value_enum, default_value_t = TxType::Purchase)]
    pub transaction_type: TxType,

    /// Application as AID:KERNEL-ID[:HEX-TLV], repeatable
    #[arg(long = "app", value_parser = parse_app, required = true)]
    pub apps: Vec<AppArg>,
}

impl TransactionArgs {
    pub fn currency(&self) -> Currency {
        Currency::new(self.currency, self.exponent)
    }

    pub fn transaction_type(&self) -> TransactionType {
        self.transaction_type.into()
    }

    pub fn applications(&self) -> (Vec<CardApplication>, Vec<CardAppConfiguration>) {
        let tt = self.transaction_type();
        self.apps
            .iter()
            .map(|a| {
                (
                    CardApplication::new(a.aid.clone(), a.kernel_type),
                    CardAppConfiguration::new(a.aid.clone(), tt, a.config.clone()),
                )
            })
            .unzip()
    }
}
