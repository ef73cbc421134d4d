//! Server-rendered device table.

use crate::registry::OnlineStatus;
use crate::service::DeviceView;
use chrono::{DateTime, Local, Utc};
use std::fmt::Write;

const STYLE: &str = "body{font-family:sans-serif;margin:2em}\
table{border-collapse:collapse;width:100%}\
th,td{padding:6px 10px;border-bottom:1px solid #ddd;text-align:left}\
th{background:#2980b9;color:#fff}\
.online{color:#27ae60}.offline{color:#c0392b}\
.badge{font-size:0.8em;padding:1px 6px;border-radius:3px;background:#f39c12;color:#fff}";

/// Render the merged listing as a standalone HTML page.
pub fn render_device_table(devices: &[DeviceView], generated_at: DateTime<Utc>) -> String {
    let mut html = String::with_capacity(1024 + devices.len() * 512);

    let _ = write!(
        html,
        "<!DOCTYPE html><html><head><meta charset=\"utf-8\">\
         <meta http-equiv=\"refresh\" content=\"30\">\
         <title>Network roster</title><style>{STYLE}</style></head><body>\
         <h1>Network roster</h1><p>{} devices, updated {}</p>\
         <table><thead><tr><th>Address</th><th>Name</th><th>MAC</th><th>Vendor</th>\
         <th>Status</th><th>Type</th><th>Owner</th><th>Location</th><th>Last seen</th>\
         </tr></thead><tbody>",
        devices.len(),
        generated_at.with_timezone(&Local).format("%Y-%m-%d %H:%M:%S")
    );

    for view in devices {
        let device = &view.device;
        let status_class = match device.online_status {
            OnlineStatus::Online => "online",
            OnlineStatus::Offline => "offline",
        };
        let badge = if device.is_new_this_session && !device.is_known {
            " <span class=\"badge\">new</span>"
        } else {
            ""
        };

        let _ = write!(
            html,
            "<tr><td>{}{}</td><td>{}</td><td>{}</td><td>{}</td>\
             <td class=\"{}\">{}</td><td>{}</td><td>{}</td><td>{}</td><td>{}</td></tr>",
            escape(&device.address),
            badge,
            escape(&device.display_name),
            escape(&device.hardware_address),
            escape(device.vendor.as_deref().unwrap_or("")),
            status_class,
            device.online_status,
            escape(&view.annotation.device_type),
            escape(&view.annotation.owner),
            escape(&view.annotation.location),
            device
                .last_seen_at
                .with_timezone(&Local)
                .format("%Y-%m-%d %H:%M:%S"),
        );
    }

    html.push_str("</tbody></table></body></html>");
    html
}

fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}
