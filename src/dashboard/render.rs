//! Plain-text rendering of dashboard views for the terminal.

use std::fmt::Write as _;

use crate::format::{format_currency, format_date, format_signed_amount};
use crate::models::{category_label, Transaction};

use super::summary::{CategoryTotal, MonthlySummary, Totals};

const TITLE_WIDTH: usize = 28;
const BAR_WIDTH: usize = 24;

fn truncate(text: &str, width: usize) -> String {
    if text.chars().count() <= width {
        return text.to_string();
    }
    let mut out: String = text.chars().take(width.saturating_sub(1)).collect();
    out.push('…');
    out
}

fn pad(text: &str, width: usize) -> String {
    let len = text.chars().count();
    format!("{text}{}", " ".repeat(width.saturating_sub(len)))
}

/// One list line: date, title, category, signed amount and the id used by
/// `show` and `delete`.
pub fn render_row(txn: &Transaction, symbol: &str) -> String {
    format!(
        "{}  {}  {}  {:>14}  [{}]",
        pad(&format_date(txn.date), 11),
        pad(&truncate(&txn.title, TITLE_WIDTH), TITLE_WIDTH),
        pad(category_label(&txn.category), 12),
        format_signed_amount(txn, symbol),
        txn.id
    )
}

pub fn render_list(transactions: &[Transaction], symbol: &str) -> String {
    if transactions.is_empty() {
        return "Henüz işlem yok. Başlamak için bir tane ekleyin!".to_string();
    }
    transactions
        .iter()
        .map(|t| render_row(t, symbol))
        .collect::<Vec<_>>()
        .join("\n")
}

pub fn render_detail(txn: &Transaction, symbol: &str) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "{}", txn.title);
    let _ = writeln!(out, "  Tutar:     {}", format_signed_amount(txn, symbol));
    let _ = writeln!(out, "  Tür:       {}", txn.kind.label());
    let _ = writeln!(out, "  Kategori:  {}", category_label(&txn.category));
    let _ = writeln!(out, "  Tarih:     {}", format_date(txn.date));
    let _ = writeln!(
        out,
        "  Eklendi:   {}",
        txn.created_at.format("%Y-%m-%d %H:%M")
    );
    let _ = write!(
        out,
        "  Fiş:       {}",
        txn.receipt_url.as_deref().unwrap_or("Yok")
    );
    out
}

fn bar(value: rust_decimal::Decimal, max: rust_decimal::Decimal) -> String {
    if max.is_zero() {
        return String::new();
    }
    let ratio = value / max;
    let filled = (ratio * rust_decimal::Decimal::from(BAR_WIDTH as u64))
        .round()
        .to_string()
        .parse::<usize>()
        .unwrap_or(0)
        .min(BAR_WIDTH);
    "█".repeat(filled)
}

pub fn render_summary(
    totals: &Totals,
    categories: &[CategoryTotal],
    months: &[MonthlySummary],
    symbol: &str,
) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "Toplam Bakiye  {}", format_currency(totals.balance, symbol));
    let _ = writeln!(out, "Gelir          {}", format_currency(totals.income, symbol));
    let _ = writeln!(out, "Gider          {}", format_currency(totals.expense, symbol));

    if !categories.is_empty() {
        let _ = writeln!(out, "\nKategori Dağılımı");
        let max = categories.iter().map(|c| c.total).max().unwrap_or_default();
        for c in categories {
            let _ = writeln!(
                out,
                "  {}  {:>14}  {}",
                pad(category_label(&c.category), 12),
                format_currency(c.total, symbol),
                bar(c.total, max)
            );
        }
    }

    let _ = writeln!(out, "\nGelir vs Gider");
    let max = months
        .iter()
        .flat_map(|m| [m.income, m.expense])
        .max()
        .unwrap_or_default();
    for m in months {
        let _ = writeln!(
            out,
            "  {} {}  +{:>14}  {}",
            m.label,
            m.year,
            format_currency(m.income, symbol),
            bar(m.income, max)
        );
        let _ = writeln!(
            out,
            "            -{:>14}  {}",
            format_currency(m.expense, symbol),
            bar(m.expense, max)
        );
    }
    out.trim_end().to_string()
}
