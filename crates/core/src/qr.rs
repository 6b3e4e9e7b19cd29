//! QR codes pointing at the public product page.

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use qrcode::render::svg;
use qrcode::{EcLevel, QrCode};
use thiserror::Error;
use uuid::Uuid;

/// Smallest rendered edge, in pixels. Modules scale up to reach it.
const MIN_DIMENSION_PX: u32 = 290;

#[derive(Debug, Error)]
#[error("could not encode QR code: {0}")]
pub struct QrError(#[from] qrcode::types::QrError);

/// `{base}/qr/view/{id}/`, tolerating a trailing slash on `app_base_url`.
pub fn public_url(app_base_url: &str, id: Uuid) -> String {
    format!("{}/qr/view/{id}/", app_base_url.trim_end_matches('/'))
}

/// SVG rendering with low error correction and the standard 4-module quiet zone.
pub fn render_svg(data: &str) -> Result<String, QrError> {
    let code = QrCode::with_error_correction_level(data.as_bytes(), EcLevel::L)?;
    Ok(code
        .render::<svg::Color>()
        .quiet_zone(true)
        .min_dimensions(MIN_DIMENSION_PX, MIN_DIMENSION_PX)
        .dark_color(svg::Color("#000000"))
        .light_color(svg::Color("#ffffff"))
        .build())
}

/// `data:` URI usable directly as an `<img src>`.
pub fn svg_data_uri(data: &str) -> Result<String, QrError> {
    let svg = render_svg(data)?;
    Ok(format!("data:image/svg+xml;base64,{}", STANDARD.encode(svg)))
}

#[cfg(test)]
mod tests {
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine as _;
    use uuid::Uuid;

    use super::{public_url, render_svg, svg_data_uri};

    #[test]
    fn public_url_has_single_slashes() {
        let id = Uuid::nil();
        assert_eq!(
            public_url("https://app.example.com/", id),
            "https://app.example.com/qr/view/00000000-0000-0000-0000-000000000000/"
        );
        assert_eq!(public_url("https://app.example.com", id), public_url("https://app.example.com/", id));
    }

    #[test]
    fn svg_is_rendered() {
        let svg = render_svg("https://app.example.com/qr/view/x/").expect("svg");
        assert!(svg.contains("<svg"));
        assert!(svg.contains("#000000"));
    }

    #[test]
    fn data_uri_wraps_svg() {
        let uri = svg_data_uri("hello").expect("uri");
        let encoded = uri.strip_prefix("data:image/svg+xml;base64,").expect("prefix");
        let decoded = String::from_utf8(STANDARD.decode(encoded).expect("base64")).expect("utf8");

        assert!(decoded.contains("<svg"));
    }
}
