use std::collections::{BTreeMap, BTreeSet};

use foundation::ClientId;

use crate::client::Client;
use crate::site::{Category, Site};

/// Distinct values among active sites, sorted, for populating filter controls.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Facets {
    pub categories: Vec<Category>,
    pub provinces: Vec<String>,
    pub years: Vec<i32>,
    /// Client id with its display name (falls back to the id).
    pub clients: Vec<(ClientId, String)>,
}

impl Facets {
    pub fn collect(sites: &[Site], clients: &[Client]) -> Self {
        let names: BTreeMap<&ClientId, &str> =
            clients.iter().map(|c| (&c.id, c.name.as_str())).collect();

        let mut categories = BTreeSet::new();
        let mut provinces = BTreeSet::new();
        let mut years = BTreeSet::new();
        let mut client_ids = BTreeSet::new();
        for site in sites.iter().filter(|s| s.is_active()) {
            categories.insert(site.category.clone());
            if !site.province.is_empty() {
                provinces.insert(site.province.clone());
            }
            years.insert(site.year);
            if let Some(c) = &site.client_id {
                client_ids.insert(c.clone());
            }
        }

        let clients = client_ids
            .into_iter()
            .map(|id| {
                let name = names
                    .get(&id)
                    .map(|n| n.to_string())
                    .unwrap_or_else(|| id.to_string());
                (id, name)
            })
            .collect();

        Self {
            categories: categories.into_iter().collect(),
            provinces: provinces.into_iter().collect(),
            years: years.into_iter().collect(),
            clients,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::Facets;
    use crate::client::Client;
    use crate::site::{Category, Site, SiteStatus};
    use foundation::LngLat;
    use pretty_assertions::assert_eq;

    fn site(id: &str, category: &str, province: &str, year: i32) -> Site {
        Site::new(id, id, LngLat::new(100.0, 14.0).unwrap(), category, province, year)
    }

    #[test]
    fn collects_sorted_distinct_values_from_active_sites() {
        let sites = vec![
            site("a", "wind", "Chiang Mai", 2021).with_client("c2"),
            site("b", "solar", "Bangkok", 2019).with_client("c1"),
            site("c", "solar", "Bangkok", 2021),
            site("d", "hydro", "Krabi", 2010).with_status(Some(SiteStatus::Hidden)),
        ];
        let clients = vec![Client::new("c1", "Acme")];
        let f = Facets::collect(&sites, &clients);

        assert_eq!(f.categories, vec![Category::new("solar"), Category::new("wind")]);
        assert_eq!(f.provinces, vec!["Bangkok".to_string(), "Chiang Mai".to_string()]);
        assert_eq!(f.years, vec![2019, 2021]);
        let client_names: Vec<&str> = f.clients.iter().map(|(_, n)| n.as_str()).collect();
        assert_eq!(client_names, vec!["Acme", "c2"]);
    }
}
