use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::models::CommittedOrder;
use crate::money::money;

pub const DEFAULT_BUSINESS_NAME: &str = "Receipt";
pub const DEFAULT_ACCENT: &str = "#111827";
pub const DEFAULT_PAPER_WIDTH_MM: u32 = 80;

/// Merchant branding, stored remotely per seller in `receipt_settings`.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ReceiptSettings {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub business_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub logo_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub footer_note: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub show_order_number: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub accent_color: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub paper_width_mm: Option<u32>,
}

impl ReceiptSettings {
    pub fn business_name(&self) -> &str {
        non_empty(self.business_name.as_deref()).unwrap_or(DEFAULT_BUSINESS_NAME)
    }

    pub fn paper_width_mm(&self) -> u32 {
        match self.paper_width_mm {
            Some(w) if (40..=120).contains(&w) => w,
            _ => DEFAULT_PAPER_WIDTH_MM,
        }
    }

    /// Accent colour as a CSS hex colour; anything else falls back to the default.
    pub fn accent(&self) -> &str {
        match non_empty(self.accent_color.as_deref()) {
            Some(c) if is_hex_color(c) => c,
            _ => DEFAULT_ACCENT,
        }
    }

    pub fn shows_order_number(&self) -> bool {
        self.show_order_number != Some(false)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReceiptItem {
    pub name: String,
    pub quantity: u32,
    pub unit_price: Decimal,
    pub total: Decimal,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentLine {
    pub label: String,
    pub amount: Decimal,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderReceiptDoc {
    pub order_number: String,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub cashier_name: Option<String>,
    #[serde(default)]
    pub customer_name: Option<String>,
    #[serde(default)]
    pub items: Vec<ReceiptItem>,
    #[serde(default)]
    pub payments: Vec<PaymentLine>,
    pub total: Decimal,
    #[serde(default)]
    pub change: Decimal,
}

impl From<&CommittedOrder> for OrderReceiptDoc {
    fn from(order: &CommittedOrder) -> Self {
        Self {
            order_number: order.order_number.clone(),
            created_at: order.created_at,
            cashier_name: Some(order.cashier.clone()),
            customer_name: order.customer_name.clone(),
            items: order
                .lines
                .iter()
                .map(|l| ReceiptItem {
                    name: l.name.clone(),
                    quantity: l.quantity,
                    unit_price: l.unit_price,
                    total: l.total,
                })
                .collect(),
            payments: order
                .payments
                .iter()
                .map(|p| PaymentLine {
                    label: p.method.label().to_string(),
                    amount: p.amount,
                })
                .collect(),
            total: order.total,
            change: order.change(),
        }
    }
}

/// Free-form receipt not tied to an order (manual slips, reprints).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CustomReceiptDoc {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub lines: Vec<String>,
    pub total: Decimal,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "doc", rename_all = "snake_case")]
pub enum ReceiptDocument {
    Order(OrderReceiptDoc),
    NoOrder(CustomReceiptDoc),
}

fn esc(input: &str) -> String {
    input
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&#39;")
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

fn is_hex_color(value: &str) -> bool {
    let Some(hex) = value.strip_prefix('#') else {
        return false;
    };
    matches!(hex.len(), 3 | 6) && hex.chars().all(|c| c.is_ascii_hexdigit())
}

fn safe_logo_url(value: Option<&str>) -> Option<&str> {
    non_empty(value).filter(|url| {
        let lower = url.to_ascii_lowercase();
        lower.starts_with("https://") || lower.starts_with("http://") || lower.starts_with("data:image/")
    })
}

fn format_date(at: &DateTime<Utc>) -> String {
    at.format("%Y-%m-%d %H:%M").to_string()
}

fn meta_line(label: &str, value: &str) -> String {
    format!("<div><strong>{label}:</strong> {}</div>", esc(value))
}

/// Render the receipt body as an HTML fragment sized to the paper width.
pub fn render_html(settings: &ReceiptSettings, document: &ReceiptDocument) -> String {
    let width = settings.paper_width_mm();
    let muted = "font-size:12px;color:#6b7280";

    let mut body = format!(
        "<div class=\"receipt\" style=\"width:{width}mm;max-width:{width}mm;margin:0 auto;padding:12px;line-height:1.2\">"
    );

    body.push_str(
        "<div style=\"text-align:center;border-bottom:1px dashed #e5e7eb;padding-bottom:8px;margin-bottom:8px\">",
    );
    if let Some(logo) = safe_logo_url(settings.logo_url.as_deref()) {
        body.push_str(&format!(
            "<img src=\"{}\" alt=\"logo\" style=\"max-height:60px;margin-bottom:6px\"/>",
            esc(logo)
        ));
    }
    body.push_str(&format!(
        "<div style=\"font-weight:700;color:{}\">{}</div>",
        settings.accent(),
        esc(settings.business_name())
    ));
    if let Some(address) = non_empty(settings.address.as_deref()) {
        body.push_str(&format!("<div style=\"{muted}\">{}</div>", esc(address)));
    }
    if let Some(phone) = non_empty(settings.phone.as_deref()) {
        body.push_str(&format!("<div style=\"{muted}\">{}</div>", esc(phone)));
    }
    body.push_str("</div>");

    body.push_str("<div style=\"font-size:12px;color:#374151;margin-bottom:8px\">");
    let total = match document {
        ReceiptDocument::Order(doc) => {
            body.push_str(&meta_line("Date", &format_date(&doc.created_at)));
            if settings.shows_order_number() {
                if let Some(number) = non_empty(Some(&doc.order_number)) {
                    body.push_str(&meta_line("Order #", number));
                }
            }
            if let Some(cashier) = non_empty(doc.cashier_name.as_deref()) {
                body.push_str(&meta_line("Cashier", cashier));
            }
            if let Some(customer) = non_empty(doc.customer_name.as_deref()) {
                body.push_str(&meta_line("Customer", customer));
            }
            body.push_str("</div>");

            if !doc.items.is_empty() {
                body.push_str("<table style=\"width:100%;font-size:12px;margin-bottom:8px\"><tbody>");
                for item in &doc.items {
                    body.push_str(&format!(
                        "<tr><td>{}</td><td style=\"text-align:right\">{} x {}</td><td style=\"text-align:right\">{}</td></tr>",
                        esc(&item.name),
                        item.quantity,
                        money(item.unit_price),
                        money(item.total)
                    ));
                }
                body.push_str("</tbody></table>");
            }
            doc.total
        }
        ReceiptDocument::NoOrder(doc) => {
            body.push_str(&meta_line("Date", &format_date(&doc.created_at)));
            if let Some(title) = non_empty(doc.title.as_deref()) {
                body.push_str(&meta_line("Title", title));
            }
            body.push_str("</div>");
            for line in &doc.lines {
                body.push_str(&format!("<div>{}</div>", esc(line)));
            }
            doc.total
        }
    };

    body.push_str(&format!(
        "<div style=\"border-top:1px dashed #e5e7eb;padding-top:8px;margin-top:8px;font-weight:700;display:flex;justify-content:space-between\"><span>Total</span><span>{}</span></div>",
        money(total)
    ));

    if let ReceiptDocument::Order(doc) = document {
        if !doc.payments.is_empty() {
            body.push_str("<div style=\"font-size:12px;margin-top:4px\">");
            for payment in &doc.payments {
                body.push_str(&format!(
                    "<div style=\"display:flex;justify-content:space-between\"><span>{}</span><span>{}</span></div>",
                    esc(&payment.label),
                    money(payment.amount)
                ));
            }
            if doc.change > Decimal::ZERO {
                body.push_str(&format!(
                    "<div style=\"display:flex;justify-content:space-between\"><span>Change</span><span>{}</span></div>",
                    money(doc.change)
                ));
            }
            body.push_str("</div>");
        }
    }

    if let Some(footer) = non_empty(settings.footer_note.as_deref()) {
        body.push_str(&format!(
            "<div style=\"text-align:center;margin-top:10px;font-size:11px;color:#6b7280\">{}</div>",
            esc(footer)
        ));
    }
    body.push_str("</div>");
    body
}

/// Wrap a rendered fragment into a standalone printable page.
pub fn print_page(fragment: &str, paper_width_mm: u32) -> String {
    format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head>
<meta charset="UTF-8"/>
<meta name="viewport" content="width=device-width, initial-scale=1.0"/>
<title>Receipt</title>
<style>
@page {{ size: {paper_width_mm}mm auto; margin: 0; }}
html, body {{ margin: 0; padding: 0; }}
@media print {{ .no-print {{ display: none !important; }} }}
body {{ font-family: ui-sans-serif, system-ui, -apple-system, "Segoe UI", Roboto, Arial, sans-serif; }}
</style>
</head>
<body>{fragment}</body>
</html>"#
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use std::str::FromStr;

    fn d(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    fn order_doc() -> OrderReceiptDoc {
        OrderReceiptDoc {
            order_number: "ORD-1700000000000".to_string(),
            created_at: Utc.with_ymd_and_hms(2024, 3, 9, 14, 5, 0).unwrap(),
            cashier_name: Some("amina@shop.so".to_string()),
            customer_name: None,
            items: vec![ReceiptItem {
                name: "Widget".to_string(),
                quantity: 3,
                unit_price: d("10.00"),
                total: d("27.00"),
            }],
            payments: vec![PaymentLine {
                label: "Cash".to_string(),
                amount: d("30.00"),
            }],
            total: d("27.00"),
            change: d("3.00"),
        }
    }

    #[test]
    fn renders_order_lines_and_totals() {
        let html = render_html(&ReceiptSettings::default(), &ReceiptDocument::Order(order_doc()));
        assert!(html.contains("Widget"));
        assert!(html.contains("3 x 10.00"));
        assert!(html.contains("<span>27.00</span>"));
        assert!(html.contains("<strong>Order #:</strong> ORD-1700000000000"));
        assert!(html.contains("<strong>Date:</strong> 2024-03-09 14:05"));
        assert!(html.contains("<span>Change</span><span>3.00</span>"));
        assert!(html.contains(DEFAULT_BUSINESS_NAME));
        assert!(html.contains("width:80mm"));
    }

    #[test]
    fn escapes_free_text() {
        let settings = ReceiptSettings {
            business_name: Some("<script>alert('x')</script>".to_string()),
            footer_note: Some("Tom & \"Jerry\"".to_string()),
            ..ReceiptSettings::default()
        };
        let mut doc = order_doc();
        doc.items[0].name = "<b>bold</b>".to_string();
        let html = render_html(&settings, &ReceiptDocument::Order(doc));
        assert!(!html.contains("<script>"));
        assert!(html.contains("&lt;script&gt;alert(&#39;x&#39;)&lt;/script&gt;"));
        assert!(html.contains("Tom &amp; &quot;Jerry&quot;"));
        assert!(html.contains("&lt;b&gt;bold&lt;/b&gt;"));
    }

    #[test]
    fn omits_absent_sections() {
        let html = render_html(&ReceiptSettings::default(), &ReceiptDocument::Order(order_doc()));
        assert!(!html.contains("<img"));
        assert!(!html.contains("Customer:"));
        assert!(!html.contains("font-size:11px"));
    }

    #[test]
    fn hides_order_number_when_disabled() {
        let settings = ReceiptSettings {
            show_order_number: Some(false),
            ..ReceiptSettings::default()
        };
        let html = render_html(&settings, &ReceiptDocument::Order(order_doc()));
        assert!(!html.contains("Order #"));
    }

    #[test]
    fn sanitizes_accent_and_logo() {
        let settings = ReceiptSettings {
            accent_color: Some("red;background:url(x)".to_string()),
            logo_url: Some("javascript:alert(1)".to_string()),
            ..ReceiptSettings::default()
        };
        let html = render_html(&settings, &ReceiptDocument::Order(order_doc()));
        assert!(html.contains(&format!("color:{DEFAULT_ACCENT}")));
        assert!(!html.contains("javascript:"));

        let ok = ReceiptSettings {
            accent_color: Some("#0a7".to_string()),
            logo_url: Some("https://cdn.example.com/logo.png?a=1&b=2".to_string()),
            ..ReceiptSettings::default()
        };
        let html = render_html(&ok, &ReceiptDocument::Order(order_doc()));
        assert!(html.contains("color:#0a7"));
        assert!(html.contains("src=\"https://cdn.example.com/logo.png?a=1&amp;b=2\""));
    }

    #[test]
    fn renders_no_order_document() {
        let doc = ReceiptDocument::NoOrder(CustomReceiptDoc {
            title: Some("Deposit".to_string()),
            lines: vec!["Layaway #4".to_string(), "<note>".to_string()],
            total: d("12.5"),
            created_at: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
        });
        let html = render_html(&ReceiptSettings::default(), &doc);
        assert!(html.contains("<strong>Title:</strong> Deposit"));
        assert!(html.contains("<div>&lt;note&gt;</div>"));
        assert!(html.contains("<span>12.50</span>"));
        assert!(!html.contains("Order #"));
    }

    #[test]
    fn out_of_range_paper_width_falls_back() {
        let settings = ReceiptSettings {
            paper_width_mm: Some(58),
            ..ReceiptSettings::default()
        };
        assert_eq!(settings.paper_width_mm(), 58);
        let silly = ReceiptSettings {
            paper_width_mm: Some(4000),
            ..ReceiptSettings::default()
        };
        assert_eq!(silly.paper_width_mm(), DEFAULT_PAPER_WIDTH_MM);
    }

    #[test]
    fn print_page_sizes_the_page() {
        let page = print_page("<p>hi</p>", 58);
        assert!(page.starts_with("<!DOCTYPE html>"));
        assert!(page.contains("@page { size: 58mm auto; margin: 0; }"));
        assert!(page.contains("<body><p>hi</p></body>"));
    }
}
