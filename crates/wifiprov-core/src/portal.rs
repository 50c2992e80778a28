//! Configuration portal form.
//!
//! The portal shows the usual network fields (SSID and passphrase) followed
//! by the device's own parameters. Submitted values come back as raw strings
//! in a [`RawFields`] map; [`settings_from_fields`] turns them into
//! [`DeviceSettings`].
//!
//! The HTTP server that serves the page belongs to the platform. This module
//! only builds the markup and decodes the submitted body.

use std::collections::BTreeMap;
use std::fmt::Write as _;

use crate::settings::{DeviceSettings, Weekday, MAX_LABEL_CHARS};

/// Form field carrying [`DeviceSettings::label`].
pub const KEY_TEXT: &str = "key_text";
/// Form field carrying [`DeviceSettings::count`].
pub const KEY_NUM: &str = "key_num";
/// Checkbox carrying [`DeviceSettings::flag`].
pub const KEY_BOOL: &str = "key_bool";
/// Hidden field carrying [`DeviceSettings::selected_day`].
pub const KEY_DAY: &str = "key_custom";
/// Network SSID field.
pub const KEY_SSID: &str = "s";
/// Network passphrase field.
pub const KEY_PASSWORD: &str = "p";

/// Value a checked checkbox submits.
pub const CHECKBOX_VALUE: &str = "T";

/// One entry of the portal form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PortalParam {
    /// An `<input>` with a label.
    Input {
        id: String,
        label: String,
        value: String,
        max_len: usize,
        /// Extra attributes placed inside the tag, e.g. `type="checkbox" checked`.
        attributes: String,
    },
    /// Raw markup inserted as-is.
    Html(String),
}

impl PortalParam {
    pub fn input(id: &str, label: &str, value: impl Into<String>, max_len: usize) -> Self {
        PortalParam::Input {
            id: id.to_string(),
            label: label.to_string(),
            value: value.into(),
            max_len,
            attributes: String::new(),
        }
    }

    pub fn with_attributes(mut self, attrs: &str) -> Self {
        if let PortalParam::Input { attributes, .. } = &mut self {
            *attributes = attrs.to_string();
        }
        self
    }

    /// Field id, if this is an input.
    pub fn id(&self) -> Option<&str> {
        match self {
            PortalParam::Input { id, .. } => Some(id),
            PortalParam::Html(_) => None,
        }
    }

    /// Prefilled value, if this is an input.
    pub fn value(&self) -> Option<&str> {
        match self {
            PortalParam::Input { value, .. } => Some(value),
            PortalParam::Html(_) => None,
        }
    }

    fn render(&self, out: &mut String) {
        match self {
            PortalParam::Input {
                id,
                label,
                value,
                max_len,
                attributes,
            } => {
                let _ = write!(
                    out,
                    "<br/><label for='{id}'>{}</label>\
                     <input id='{id}' name='{id}' maxlength='{max_len}' value='{}' {attributes}>",
                    escape_html(label),
                    escape_html(value),
                );
            }
            PortalParam::Html(html) => out.push_str(html),
        }
    }
}

/// The ordered set of device parameters shown on the portal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortalForm {
    params: Vec<PortalParam>,
}

impl PortalForm {
    /// Build the form, prefilled with the current settings.
    pub fn for_settings(settings: &DeviceSettings) -> Self {
        let day = settings.weekday().index();

        let checkbox_attrs = if settings.flag {
            "type=\"checkbox\" checked"
        } else {
            "type=\"checkbox\""
        };

        // The hidden day field has to come before the script that hides it.
        let params = vec![
            PortalParam::input(
                KEY_TEXT,
                "Enter your string here",
                settings.label.clone(),
                MAX_LABEL_CHARS + 1,
            ),
            PortalParam::input(
                KEY_NUM,
                "Enter your number here",
                settings.count.to_string(),
                7,
            ),
            PortalParam::input(KEY_BOOL, "Checkbox", CHECKBOX_VALUE, 2)
                .with_attributes(checkbox_attrs),
            PortalParam::input(KEY_DAY, "Will be hidden", day.to_string(), 2),
            PortalParam::Html(day_selector_html(day)),
        ];

        Self { params }
    }

    pub fn params(&self) -> &[PortalParam] {
        &self.params
    }

    /// Find an input by id.
    pub fn param(&self, id: &str) -> Option<&PortalParam> {
        self.params.iter().find(|p| p.id() == Some(id))
    }

    /// Render the device parameters only.
    pub fn render_params(&self) -> String {
        let mut out = String::new();
        for param in &self.params {
            param.render(&mut out);
        }
        out
    }

    /// Render the full portal page, including the network fields.
    ///
    /// The form posts `application/x-www-form-urlencoded` to `action`.
    pub fn render_page(&self, title: &str, action: &str) -> String {
        let mut out = String::new();
        let _ = write!(
            out,
            "<!DOCTYPE html><html><head><meta charset='utf-8'>\
             <meta name='viewport' content='width=device-width,initial-scale=1'>\
             <title>{title}</title></head><body><h1>{title}</h1>\
             <form method='POST' action='{action}'>\
             <label for='{KEY_SSID}'>SSID</label>\
             <input id='{KEY_SSID}' name='{KEY_SSID}' maxlength='32'>\
             <br/><label for='{KEY_PASSWORD}'>Password</label>\
             <input id='{KEY_PASSWORD}' name='{KEY_PASSWORD}' maxlength='64' type='password'>",
            title = escape_html(title),
            action = escape_html(action),
        );
        out.push_str(&self.render_params());
        out.push_str("<br/><button type='submit'>Save</button></form></body></html>");
        out
    }
}

/// Weekday `<select>` that mirrors its choice into the hidden day field.
fn day_selector_html(selected: i32) -> String {
    let mut options = String::new();
    for day in Weekday::ALL {
        let _ = write!(
            options,
            "\n    <option value=\"{}\">{}</option>",
            day.index(),
            day.name()
        );
    }

    format!(
        r#"
  <br/><label for='day'>Custom Field Label</label>
  <select name="dayOfWeek" id="day" onchange="document.getElementById('{KEY_DAY}').value = this.value">{options}
  </select>
  <script>
    document.getElementById('day').value = "{selected}";
    document.querySelector("[for='{KEY_DAY}']").hidden = true;
    document.getElementById('{KEY_DAY}').hidden = true;
  </script>
  "#
    )
}

fn escape_html(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            c => out.push(c),
        }
    }
    out
}

/// Raw submitted values, keyed by field id.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawFields(BTreeMap<String, String>);

impl RawFields {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a field, replacing any earlier value.
    pub fn insert(&mut self, id: impl Into<String>, value: impl Into<String>) {
        self.0.insert(id.into(), value.into());
    }

    pub fn get(&self, id: &str) -> Option<&str> {
        self.0.get(id).map(String::as_str)
    }

    /// A field's value, or `""` when it was not submitted.
    ///
    /// Browsers leave unchecked checkboxes out of the body entirely.
    pub fn value(&self, id: &str) -> &str {
        self.get(id).unwrap_or("")
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Network credentials, if an SSID was submitted.
    pub fn credentials(&self) -> Option<WifiCredentials> {
        let ssid = self.get(KEY_SSID)?.trim();
        if ssid.is_empty() {
            return None;
        }
        Some(WifiCredentials {
            ssid: ssid.to_string(),
            password: self.value(KEY_PASSWORD).to_string(),
        })
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for RawFields {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut fields = RawFields::new();
        for (k, v) in iter {
            fields.insert(k, v);
        }
        fields
    }
}

/// Station credentials entered on the portal.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct WifiCredentials {
    pub ssid: String,
    pub password: String,
}

/// Decode an `application/x-www-form-urlencoded` body.
///
/// When a field appears more than once the first value wins.
pub fn decode_form(body: &str) -> RawFields {
    let mut fields = RawFields::new();
    for pair in body.split('&').filter(|p| !p.is_empty()) {
        let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
        fields
            .0
            .entry(percent_decode(key))
            .or_insert_with(|| percent_decode(value));
    }
    fields
}

/// Decode `+` and `%XX` escapes. Malformed escapes are kept literally.
fn percent_decode(s: &str) -> String {
    let bytes = s.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'+' => out.push(b' '),
            b'%' if i + 2 < bytes.len() => {
                match (hex_val(bytes[i + 1]), hex_val(bytes[i + 2])) {
                    (Some(hi), Some(lo)) => {
                        out.push(hi << 4 | lo);
                        i += 2;
                    }
                    _ => out.push(b'%'),
                }
            }
            b => out.push(b),
        }
        i += 1;
    }
    String::from_utf8_lossy(&out).into_owned()
}

fn hex_val(b: u8) -> Option<u8> {
    match b {
        b'0'..=b'9' => Some(b - b'0'),
        b'a'..=b'f' => Some(b - b'a' + 10),
        b'A'..=b'F' => Some(b - b'A' + 10),
        _ => None,
    }
}

/// Best-effort integer parse with C `atoi` semantics.
///
/// Skips leading whitespace, takes an optional sign and then as many digits
/// as follow. Anything else yields 0. Out-of-range values saturate.
pub fn parse_int_lenient(raw: &str) -> i32 {
    let s = raw.trim_start();
    let (negative, digits) = match s.as_bytes().first() {
        Some(b'-') => (true, &s[1..]),
        Some(b'+') => (false, &s[1..]),
        _ => (false, s),
    };

    let limit = i64::from(i32::MAX) + 1;
    let magnitude = digits
        .bytes()
        .take_while(u8::is_ascii_digit)
        .fold(0i64, |acc, b| (acc * 10 + i64::from(b - b'0')).min(limit));

    let value = if negative { -magnitude } else { magnitude };
    value.clamp(i64::from(i32::MIN), i64::from(i32::MAX)) as i32
}

/// Checkbox semantics: true iff the value starts with `'T'`.
pub fn parse_flag(raw: &str) -> bool {
    raw.starts_with('T')
}

/// Convert submitted portal fields into settings.
///
/// Fields that were not submitted are treated as empty strings, so an
/// unchecked box gives `false` and an empty number gives 0. The day index
/// is not range-checked here; [`DeviceSettings::weekday`] clamps on use.
pub fn settings_from_fields(fields: &RawFields) -> DeviceSettings {
    let mut settings = DeviceSettings {
        label: String::new(),
        count: parse_int_lenient(fields.value(KEY_NUM)),
        flag: parse_flag(fields.value(KEY_BOOL)),
        selected_day: parse_int_lenient(fields.value(KEY_DAY)),
    };
    settings.set_label(fields.value(KEY_TEXT));
    settings
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_parse_int_lenient() {
        assert_eq!(parse_int_lenient("1500"), 1500);
        assert_eq!(parse_int_lenient("  -42"), -42);
        assert_eq!(parse_int_lenient("+7"), 7);
        assert_eq!(parse_int_lenient("12abc"), 12);
        assert_eq!(parse_int_lenient("abc"), 0);
        assert_eq!(parse_int_lenient(""), 0);
        assert_eq!(parse_int_lenient("-"), 0);
        assert_eq!(parse_int_lenient("99999999999"), i32::MAX);
        assert_eq!(parse_int_lenient("-99999999999"), i32::MIN);
        assert_eq!(parse_int_lenient("-2147483648"), i32::MIN);
    }

    #[test]
    fn test_parse_flag_first_char() {
        assert!(parse_flag("T"));
        assert!(parse_flag("True"));
        assert!(!parse_flag("t"));
        assert!(!parse_flag(""));
        assert!(!parse_flag("on"));
        assert!(!parse_flag(" T"));
    }

    #[test]
    fn test_settings_from_fields() {
        let fields: RawFields = [
            (KEY_TEXT, "garage"),
            (KEY_NUM, "250"),
            (KEY_BOOL, "T"),
            (KEY_DAY, "5"),
        ]
        .into_iter()
        .collect();

        let settings = settings_from_fields(&fields);
        assert_eq!(
            settings,
            DeviceSettings {
                label: "garage".to_string(),
                count: 250,
                flag: true,
                selected_day: 5,
            }
        );
    }

    #[test]
    fn test_missing_fields_are_empty() {
        let settings = settings_from_fields(&RawFields::new());
        assert_eq!(settings.label, "");
        assert_eq!(settings.count, 0);
        assert!(!settings.flag);
        assert_eq!(settings.selected_day, 0);
    }

    #[test]
    fn test_non_numeric_count_is_zero() {
        let fields: RawFields = [(KEY_NUM, "lots")].into_iter().collect();
        assert_eq!(settings_from_fields(&fields).count, 0);
    }

    #[test]
    fn test_day_not_range_checked() {
        let fields: RawFields = [(KEY_DAY, "12")].into_iter().collect();
        let settings = settings_from_fields(&fields);
        assert_eq!(settings.selected_day, 12);
        assert_eq!(settings.weekday(), Weekday::Sunday);
    }

    #[test]
    fn test_decode_form() {
        let fields = decode_form("s=Home+Net&p=p%40ss%2Fw0rd&key_text=a%26b&key_bool=T&flag");
        assert_eq!(fields.get("s"), Some("Home Net"));
        assert_eq!(fields.get("p"), Some("p@ss/w0rd"));
        assert_eq!(fields.get(KEY_TEXT), Some("a&b"));
        assert_eq!(fields.get(KEY_BOOL), Some("T"));
        assert_eq!(fields.get("flag"), Some(""));
    }

    #[test]
    fn test_decode_form_malformed_escapes() {
        let fields = decode_form("a=100%&b=%zz&c=%4&a=second");
        assert_eq!(fields.get("a"), Some("100%"));
        assert_eq!(fields.get("b"), Some("%zz"));
        assert_eq!(fields.get("c"), Some("%4"));
    }

    #[test]
    fn test_credentials() {
        let fields = decode_form("s=Home&p=secret");
        assert_eq!(
            fields.credentials(),
            Some(WifiCredentials {
                ssid: "Home".to_string(),
                password: "secret".to_string(),
            })
        );
        assert_eq!(decode_form("s=+&p=x").credentials(), None);
        assert_eq!(decode_form("key_num=1").credentials(), None);
    }

    #[test]
    fn test_form_prefilled_from_settings() {
        let settings = DeviceSettings {
            label: "it's <here>".to_string(),
            count: 77,
            flag: false,
            selected_day: 1,
        };
        let form = PortalForm::for_settings(&settings);

        let ids: Vec<_> = form.params().iter().filter_map(PortalParam::id).collect();
        assert_eq!(ids, vec![KEY_TEXT, KEY_NUM, KEY_BOOL, KEY_DAY]);
        assert_eq!(form.param(KEY_NUM).and_then(PortalParam::value), Some("77"));
        assert_eq!(form.param(KEY_DAY).and_then(PortalParam::value), Some("1"));

        let html = form.render_params();
        assert!(html.contains("value='it&#39;s &lt;here&gt;'"));
        assert!(html.contains("maxlength='50'"));
        assert!(html.contains("type=\"checkbox\">"));
        assert!(!html.contains("checked"));
        assert!(html.contains("document.getElementById('day').value = \"1\";"));
        assert!(html.contains("<option value=\"6\">Sunday</option>"));
    }

    #[test]
    fn test_checked_box_and_clamped_day() {
        let settings = DeviceSettings {
            selected_day: 40,
            ..Default::default()
        };
        let form = PortalForm::for_settings(&settings);
        let html = form.render_params();
        assert!(html.contains("type=\"checkbox\" checked"));
        assert_eq!(form.param(KEY_DAY).and_then(PortalParam::value), Some("6"));
    }

    #[test]
    fn test_render_page() {
        let page = PortalForm::for_settings(&DeviceSettings::default())
            .render_page("WifiTetris", "/wifisave");
        assert!(page.starts_with("<!DOCTYPE html>"));
        assert!(page.contains("<form method='POST' action='/wifisave'>"));
        assert!(page.contains("name='s'"));
        assert!(page.contains("name='p'"));
        assert!(page.contains("name='key_custom'"));
        assert!(page.ends_with("</form></body></html>"));
    }

    #[test]
    fn test_render_page_escapes_action() {
        let page = PortalForm::for_settings(&DeviceSettings::default())
            .render_page("T", "/save?a='x'&b=<y>");
        assert!(page.contains("action='/save?a=&#39;x&#39;&amp;b=&lt;y&gt;'"));
        assert!(!page.contains("'x'"));
    }
}
