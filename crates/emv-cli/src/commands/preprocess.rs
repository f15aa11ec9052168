use emv_entry_point::{pre_process, PreprocessedApplication, TransactionData};

use crate::formatters::{format_value, FormatMode};

use super::TransactionArgs;

pub fn cmd_preprocess(args: &TransactionArgs, format_mode: FormatMode) {
    let currency = args.currency();
    let transaction_type = args.transaction_type();

    let data = match TransactionData::new(args.amount, args.other, currency, transaction_type) {
        Ok(d) => d,
        Err(err) => {
            eprintln!("Invalid transaction: {}", err);
            return;
        }
    };

    let (apps, configs) = args.applications();
    let preprocessed = match pre_process(
        &apps,
        &configs,
        data.amount_authorized(),
        data.amount_other(),
        currency,
        transaction_type,
    ) {
        Ok(p) => p,
        Err(err) => {
            eprintln!("Pre-processing failed: {}", err);
            return;
        }
    };

    println!(
        "=== Pre-processing: {} {} (currency {}) ===\n",
        transaction_type,
        data.amount_authorized(),
        currency.numeric_code()
    );

    if preprocessed.len() < configs.len() {
        println!(
            "{} application(s) skipped, see log for details\n",
            configs.len() - preprocessed.len()
        );
    }

    for app in &preprocessed {
        print_application(app, format_mode);
    }

    if preprocessed
        .iter()
        .all(|a| a.indicators.is_contactless_application_not_allowed())
    {
        println!("Outcome: TRY ANOTHER INTERFACE (no application allowed)");
    } else {
        println!("Outcome: protocol activation");
    }
}

fn print_application(app: &PreprocessedApplication, format_mode: FormatMode) {
    let ind = &app.indicators;
    let flag = |on: bool| if on { "✓" } else { "✗" };

    println!("Application {} (kernel {})", app.application_id(), app.kernel_type.id());
    println!("  Contactless not allowed:       {}", flag(ind.is_contactless_application_not_allowed()));
    println!("  Zero amount:                   {}", flag(ind.is_zero_amount()));
    println!("  Status check requested:        {}", flag(ind.is_status_check_requested()));
    println!("  Reader CVM limit exceeded:     {}", flag(ind.is_reader_cvm_limit_exceeded()));
    println!(
        "  Contactless floor limit exceeded: {}",
        flag(ind.is_reader_contactless_floor_limit_exceeded())
    );
    match app.ttq() {
        Some(ttq) => println!("  TTQ: {}", format_value(&ttq.as_tlv(), format_mode)),
        None => println!("  TTQ: not configured"),
    }
    println!();
}
