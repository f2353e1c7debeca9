//! Message and page rendering: invoice email, reminder text, share page.
//!
//! Every value interpolated into HTML goes through `escape_html`.

use chrono::NaiveDate;

use crate::models::{Invoice, PaymentMethod, ReminderKind, User};

/// `R$ 1.234,56`
pub fn format_brl(cents: i64) -> String {
    let negative = cents < 0;
    let cents = cents.unsigned_abs();
    let reais = (cents / 100).to_string();
    let mut grouped = String::with_capacity(reais.len() + reais.len() / 3);
    for (i, ch) in reais.chars().enumerate() {
        if i > 0 && (reais.len() - i) % 3 == 0 {
            grouped.push('.');
        }
        grouped.push(ch);
    }
    let sign = if negative { "-" } else { "" };
    format!("{sign}R$ {grouped},{:02}", cents % 100)
}

/// `dd/mm/yyyy`
pub fn format_date_br(date: NaiveDate) -> String {
    date.format("%d/%m/%Y").to_string()
}

pub fn escape_html(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for ch in input.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(ch),
        }
    }
    out
}

/// Relative logo paths (`/uploads/...`) become absolute under `base_url`.
pub fn absolute_url(base_url: &str, path: &str) -> String {
    if path.starts_with("http://") || path.starts_with("https://") {
        path.to_string()
    } else {
        format!("{}/{}", base_url.trim_end_matches('/'), path.trim_start_matches('/'))
    }
}

/// Payment details a tenant shows to their clients.
#[derive(Debug, Clone, Default)]
pub struct PaymentInfo {
    pub pix_key: Option<String>,
    pub instructions: Option<String>,
}

impl PaymentInfo {
    pub fn from_user(user: &User) -> Self {
        Self {
            pix_key: user.payment_pix_key.clone().filter(|k| !k.trim().is_empty()),
            instructions: user.payment_instructions.clone().filter(|i| !i.trim().is_empty()),
        }
    }
}

pub fn invoice_email_subject(prefix: &str, invoice: &Invoice) -> String {
    format!("{} - {}", prefix, invoice.product_label())
}

/// HTML body of the invoice email sent to a tenant's client.
pub fn invoice_email_html(invoice: &Invoice, payment: &PaymentInfo) -> String {
    render_invoice_email(invoice, payment, "Você tem uma nova cobrança gerada.")
}

/// HTML body of a reminder email; the opening line follows the reminder window.
pub fn reminder_email_html(invoice: &Invoice, payment: &PaymentInfo, kind: ReminderKind) -> String {
    let date = format_date_br(invoice.due_date);
    let intro = match kind {
        ReminderKind::Upcoming => {
            format!("Sua fatura vence em {date}. Não esqueça de pagar para evitar atrasos.")
        }
        ReminderKind::DueToday => "Sua fatura vence hoje.".to_string(),
        ReminderKind::Overdue => format!("Sua fatura venceu em {date} e está em atraso."),
    };
    render_invoice_email(invoice, payment, &intro)
}

fn render_invoice_email(invoice: &Invoice, payment: &PaymentInfo, intro: &str) -> String {
    let mut payment_block = String::new();
    if let Some(ref key) = payment.pix_key {
        payment_block.push_str(&format!(
            r#"<div style="margin-top: 24px; padding: 16px; background: #f0fdf4; border-radius: 8px;">
<h3 style="margin: 0 0 12px; color: #166534;">Pagamento via PIX</h3>
<p style="margin: 0 0 4px; color: #555;">Chave PIX</p>
<p style="margin: 0; font-family: monospace; font-size: 16px; font-weight: bold;">{}</p>
</div>"#,
            escape_html(key)
        ));
    }
    if let Some(ref instructions) = payment.instructions {
        payment_block.push_str(&format!(
            r#"<div style="margin-top: 16px; padding: 16px; background: #f8fafc; border-radius: 8px;">
<h3 style="margin: 0 0 12px; color: #334155;">Instruções</h3>
<p style="margin: 0; white-space: pre-line;">{}</p>
</div>"#,
            escape_html(instructions)
        ));
    }

    format!(
        r#"<!DOCTYPE html>
<html>
<head><meta charset="utf-8"></head>
<body style="font-family: -apple-system, BlinkMacSystemFont, 'Segoe UI', Roboto, sans-serif; max-width: 600px; margin: 0 auto; padding: 20px; color: #333;">
<h2 style="color: #4f46e5;">Olá, {name}</h2>
<p>{intro}</p>
<table style="width: 100%; border-collapse: collapse; margin-top: 16px;">
<tr><td style="padding: 8px 0; color: #666;">Produto/Serviço</td><td style="padding: 8px 0; text-align: right;"><strong>{product}</strong></td></tr>
<tr><td style="padding: 8px 0; color: #666;">Valor</td><td style="padding: 8px 0; text-align: right;"><strong>{value}</strong></td></tr>
<tr><td style="padding: 8px 0; color: #666;">Vencimento</td><td style="padding: 8px 0; text-align: right;"><strong>{due}</strong></td></tr>
</table>
{payment_block}
<hr style="border: none; border-top: 1px solid #eee; margin: 30px 0;">
<p style="color: #999; font-size: 12px;">Este é um e-mail automático. Por favor, não responda.</p>
</body>
</html>"#,
        name = escape_html(&invoice.name),
        intro = escape_html(intro),
        product = escape_html(invoice.product_label()),
        value = format_brl(invoice.value_cents),
        due = format_date_br(invoice.due_date),
    )
}

/// WhatsApp reminder text for an invoice, in the tone of the dashboard's buttons.
///
/// `share_url` is appended for unpaid invoices of tenants with a logo.
pub fn reminder_message(
    invoice: &Invoice,
    method: PaymentMethod,
    payment: &PaymentInfo,
    today: NaiveDate,
    share_url: Option<&str>,
) -> String {
    let first_name = invoice.name.split_whitespace().next().unwrap_or(&invoice.name);
    let product = invoice.product_label();

    if invoice.is_paid() {
        return format!(
            "Olá {first_name}, muito obrigado pelo seu pagamento referente a *{product}*! Tenha um excelente dia!"
        );
    }

    let date = format_date_br(invoice.due_date);
    let status_text = match (invoice.due_date - today).num_days() {
        d if d < 0 => format!("que está em atraso. Ela venceu em *{date}*"),
        0 => format!("que vence *hoje* ({date})"),
        2 => format!("que vence em *{date}* (daqui a 2 dias). Não esqueça de pagar para evitar atrasos!"),
        _ => format!("que vence em *{date}*"),
    };

    let payment_line = match method {
        PaymentMethod::Pix => payment
            .pix_key
            .as_deref()
            .map(|key| format!("\n\nChave PIX: *{key}*\nPagar via PIX de preferência."))
            .unwrap_or_default(),
        PaymentMethod::Link | PaymentMethod::Boleto => payment
            .instructions
            .as_deref()
            .map(|text| format!("\n\n{text}"))
            .unwrap_or_default(),
        PaymentMethod::Whatsapp => String::new(),
    };

    let mut message = format!(
        "Olá {first_name}, lembramos que sua fatura referente a *{product}* no valor de *{}* {status_text}.{payment_line}",
        format_brl(invoice.value_cents)
    );
    if let Some(url) = share_url {
        message.push_str(&format!("\n\nVEJA O DETALHE > {url}"));
    }
    message
}

/// Reminder email subject by window.
pub fn reminder_subject(kind: ReminderKind, invoice: &Invoice) -> String {
    let prefix = match kind {
        ReminderKind::Upcoming => "Lembrete de Fatura",
        ReminderKind::DueToday => "Sua fatura vence hoje",
        ReminderKind::Overdue => "Fatura em atraso",
    };
    invoice_email_subject(prefix, invoice)
}

/// Plain-text body of the forgot-password email.
pub fn password_reset_text(name: &str, temporary_password: &str, base_url: &str) -> String {
    format!(
        "Olá {name},\n\nRecebemos uma solicitação de recuperação de senha.\n\n\
         Sua senha temporária é: {temporary_password}\n\n\
         Acesse {base_url}/login.html e altere a senha após entrar.\n\n\
         Se você não solicitou, ignore este e-mail."
    )
}

pub fn password_reset_html(name: &str, temporary_password: &str, base_url: &str) -> String {
    format!(
        r#"<!DOCTYPE html>
<html>
<head><meta charset="utf-8"></head>
<body style="font-family: -apple-system, BlinkMacSystemFont, 'Segoe UI', Roboto, sans-serif; max-width: 600px; margin: 0 auto; padding: 20px;">
<h2 style="color: #333;">Olá {name},</h2>
<p>Recebemos uma solicitação de recuperação de senha.</p>
<p>Sua senha temporária é:</p>
<div style="background: #f5f5f5; padding: 20px; border-radius: 8px; text-align: center;">
<code style="font-size: 22px; font-weight: bold; letter-spacing: 2px;">{password}</code>
</div>
<p>Acesse <a href="{base}/login.html">{base}/login.html</a> e altere a senha após entrar.</p>
<hr style="border: none; border-top: 1px solid #eee; margin: 30px 0;">
<p style="color: #999; font-size: 12px;">Se você não solicitou, ignore este e-mail.</p>
</body>
</html>"#,
        name = escape_html(name),
        password = escape_html(temporary_password),
        base = escape_html(base_url),
    )
}

/// Public invoice card with Open Graph tags for link previews.
pub fn share_page_html(
    base_url: &str,
    client_name: &str,
    value: &str,
    due_date: &str,
    logo: Option<&str>,
) -> String {
    let name = escape_html(client_name);
    let value = escape_html(value);
    let due = escape_html(due_date);
    let logo_url = logo
        .filter(|l| !l.trim().is_empty())
        .map(|l| escape_html(&absolute_url(base_url, l)));

    let og_image = logo_url
        .as_deref()
        .map(|url| format!(r#"<meta property="og:image" content="{url}">"#))
        .unwrap_or_default();
    let logo_img = logo_url
        .as_deref()
        .map(|url| format!(r#"<img src="{url}" alt="Logo" style="max-height: 80px; margin-bottom: 16px;">"#))
        .unwrap_or_default();

    format!(
        r#"<!DOCTYPE html>
<html lang="pt-BR">
<head>
<meta charset="utf-8">
<meta name="viewport" content="width=device-width, initial-scale=1">
<title>Fatura de {name}</title>
<meta property="og:title" content="Fatura - {name}">
<meta property="og:description" content="Valor: {value} - Vencimento: {due}">
<meta property="og:type" content="website">
{og_image}
</head>
<body style="font-family: -apple-system, BlinkMacSystemFont, 'Segoe UI', Roboto, sans-serif; background: #f3f4f6; margin: 0; padding: 40px 16px;">
<div style="max-width: 420px; margin: 0 auto; background: #fff; border-radius: 12px; padding: 32px; text-align: center; box-shadow: 0 4px 12px rgba(0,0,0,0.08);">
{logo_img}
<h1 style="font-size: 20px; color: #111;">Detalhes da Cobrança</h1>
<p style="color: #666; margin: 4px 0 24px;">{name}</p>
<p style="color: #666; margin: 0;">Valor</p>
<p style="font-size: 28px; font-weight: bold; color: #4f46e5; margin: 4px 0 16px;">{value}</p>
<p style="color: #666; margin: 0;">Vencimento</p>
<p style="font-size: 18px; font-weight: bold; margin: 4px 0;">{due}</p>
</div>
</body>
</html>"#
    )
}
