//! CSV export of the in-memory transaction list.

use chrono::NaiveDate;

use crate::models::Transaction;

pub const CSV_HEADER: &str = "Tarih,Başlık,Kategori,Tutar,Tür";

fn quote(field: &str) -> String {
    format!("\"{}\"", field.replace('"', "\"\""))
}

/// One row per transaction, in list order: `date,"title",category,amount,type`.
/// Only the title is quoted; embedded quotes are doubled.
pub fn export_csv(transactions: &[Transaction]) -> String {
    let mut lines = Vec::with_capacity(transactions.len() + 1);
    lines.push(CSV_HEADER.to_string());
    for txn in transactions {
        lines.push(format!(
            "{},{},{},{},{}",
            txn.date.format("%Y-%m-%d"),
            quote(&txn.title),
            txn.category,
            txn.amount.normalize(),
            txn.kind.as_str()
        ));
    }
    lines.join("\n")
}

/// `islemler_YYYY-MM-DD.csv`
pub fn export_file_name(today: NaiveDate) -> String {
    format!("islemler_{}.csv", today.format("%Y-%m-%d"))
}
