//! Company address formatting and map markers.

use std::collections::HashMap;

use serde::Serialize;

use crate::domain::customer::{Company, CompanyAddress};

#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct Coordinates {
    pub lat: f64,
    pub lon: f64,
}

impl Coordinates {
    /// Parses a geocoder `pos` value, which is `"lon lat"`.
    pub fn from_pos(pos: &str) -> Option<Self> {
        let mut parts = pos.split_whitespace();
        let lon = parts.next()?.parse::<f64>().ok()?;
        let lat = parts.next()?.parse::<f64>().ok()?;
        if parts.next().is_some() {
            return None;
        }
        Some(Self { lat, lon })
    }
}

/// Non-empty address parts, country first, joined with `", "`.
pub fn format_address(address: &CompanyAddress) -> String {
    [&address.country, &address.province, &address.city, &address.address_1, &address.address_2]
        .into_iter()
        .filter_map(|part| part.as_deref().map(str::trim).filter(|part| !part.is_empty()))
        .collect::<Vec<_>>()
        .join(", ")
}

/// An address that belongs to a known company and has text worth geocoding.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PendingMarker<'a> {
    pub company: &'a Company,
    pub address: String,
}

pub fn pending_markers<'a>(
    companies: &'a [Company],
    addresses: &[CompanyAddress],
) -> Vec<PendingMarker<'a>> {
    let by_id: HashMap<&str, &Company> =
        companies.iter().map(|company| (company.id.as_str(), company)).collect();

    addresses
        .iter()
        .filter_map(|address| {
            let company = by_id.get(address.company_id.as_str()).copied()?;
            let text = format_address(address);
            (!text.is_empty()).then_some(PendingMarker { company, address: text })
        })
        .collect()
}

/// Serialized into the page for the map script.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct MapMarker {
    pub id: String,
    pub title: String,
    pub address: String,
    pub lat: f64,
    pub lon: f64,
}

impl PendingMarker<'_> {
    pub fn locate(self, coordinates: Coordinates) -> MapMarker {
        MapMarker {
            id: self.company.id.clone(),
            title: self.company.title.clone(),
            address: self.address,
            lat: coordinates.lat,
            lon: coordinates.lon,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{format_address, pending_markers, Coordinates};
    use crate::domain::customer::{Company, CompanyAddress};

    fn address(company_id: &str, city: Option<&str>, line: Option<&str>) -> CompanyAddress {
        CompanyAddress {
            company_id: company_id.to_string(),
            country: Some("Россия".to_string()),
            city: city.map(str::to_string),
            address_1: line.map(str::to_string),
            ..CompanyAddress::default()
        }
    }

    #[test]
    fn address_parts_are_joined_in_order() {
        let formatted = format_address(&address("1", Some("Москва"), Some("Тверская, 1")));
        assert_eq!(formatted, "Россия, Москва, Тверская, 1");

        let blank = CompanyAddress { city: Some("  ".to_string()), ..CompanyAddress::default() };
        assert_eq!(format_address(&blank), "");
    }

    #[test]
    fn pos_is_longitude_first() {
        assert_eq!(
            Coordinates::from_pos("37.617635 55.755814"),
            Some(Coordinates { lat: 55.755814, lon: 37.617635 })
        );
        assert_eq!(Coordinates::from_pos("37.6"), None);
        assert_eq!(Coordinates::from_pos("a b"), None);
    }

    #[test]
    fn addresses_of_unknown_companies_are_dropped() {
        let companies = vec![Company { id: "1".to_string(), title: "Acme".to_string() }];
        let addresses = vec![
            address("1", Some("Москва"), None),
            address("2", Some("Казань"), None),
            CompanyAddress { company_id: "1".to_string(), ..CompanyAddress::default() },
        ];

        let pending = pending_markers(&companies, &addresses);

        assert_eq!(pending.len(), 1);
        let marker = pending[0].clone().locate(Coordinates { lat: 1.0, lon: 2.0 });
        assert_eq!(marker.title, "Acme");
        assert_eq!(marker.address, "Россия, Москва");
        assert_eq!(marker.lon, 2.0);
    }
}
