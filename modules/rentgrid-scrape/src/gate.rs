//! Criteria & location gate: a pure filter over raw listings.
//!
//! Grounded on the teacher's `rootsignal-scout::pipeline::geo_filter`
//! verdict-enum-plus-batch-filter shape (`GeoVerdict`, `geo_check`,
//! `filter_nodes`), applied here to price/bedroom/outcode criteria instead
//! of geo-radius/location-name.

use std::collections::HashSet;

use rentgrid_common::{outcode_of, Listing, SearchCriteria};

/// Whether a missing-outcode listing is accepted or rejected. Strict mode
/// fails closed (spec.md §4.2: "fails closed when absent").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutcodeMode {
    Strict,
    Lenient,
}

/// Result of evaluating a single listing against the gate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GateVerdict {
    Accept,
    RejectPrice,
    RejectBedrooms,
    RejectLocation,
}

impl GateVerdict {
    pub fn is_accept(&self) -> bool {
        matches!(self, GateVerdict::Accept)
    }
}

/// Counters produced by a batch gate run, folded into the pipeline-run log's
/// `criteria_pass_count`.
#[derive(Debug, Default, Clone, Copy)]
pub struct GateStats {
    pub rejected_price: u32,
    pub rejected_bedrooms: u32,
    pub rejected_location: u32,
    pub passed: u32,
}

/// Evaluate one listing. `allowed_outcodes` is the set resolved from the
/// search criteria's `areas` via [`crate::areas::resolve_outcodes`].
pub fn gate_check(
    listing: &Listing,
    criteria: &SearchCriteria,
    allowed_outcodes: &HashSet<String>,
    outcode_mode: OutcodeMode,
) -> GateVerdict {
    if listing.price_pcm < criteria.min_price || listing.price_pcm > criteria.max_price {
        return GateVerdict::RejectPrice;
    }
    if listing.bedrooms < criteria.min_bedrooms || listing.bedrooms > criteria.max_bedrooms {
        return GateVerdict::RejectBedrooms;
    }

    let outcode = listing.postcode.as_deref().and_then(outcode_of);
    match outcode {
        Some(outcode) if allowed_outcodes.contains(&outcode) => GateVerdict::Accept,
        Some(_) => GateVerdict::RejectLocation,
        None => match outcode_mode {
            OutcodeMode::Strict => GateVerdict::RejectLocation,
            OutcodeMode::Lenient => GateVerdict::Accept,
        },
    }
}

/// Batch-filter a scraped set, returning the survivors plus stage counters.
pub fn filter_listings(
    listings: Vec<Listing>,
    criteria: &SearchCriteria,
    allowed_outcodes: &HashSet<String>,
    outcode_mode: OutcodeMode,
) -> (Vec<Listing>, GateStats) {
    let mut stats = GateStats::default();
    let mut accepted = Vec::with_capacity(listings.len());

    for listing in listings {
        match gate_check(&listing, criteria, allowed_outcodes, outcode_mode) {
            GateVerdict::Accept => {
                stats.passed += 1;
                accepted.push(listing);
            }
            GateVerdict::RejectPrice => stats.rejected_price += 1,
            GateVerdict::RejectBedrooms => stats.rejected_bedrooms += 1,
            GateVerdict::RejectLocation => stats.rejected_location += 1,
        }
    }

    (accepted, stats)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rentgrid_testing::ListingBuilder;

    fn criteria() -> SearchCriteria {
        SearchCriteria {
            min_price: 1000,
            max_price: 2500,
            min_bedrooms: 1,
            max_bedrooms: 3,
            min_bathrooms: 0,
            areas: vec!["hackney".to_string()],
            furnish_types: Vec::new(),
            include_let_agreed: false,
            max_per_scraper: 100,
        }
    }

    fn outcodes() -> HashSet<String> {
        ["E8".to_string(), "E9".to_string()].into_iter().collect()
    }

    #[test]
    fn accepts_in_range_listing_in_area() {
        let listing = ListingBuilder::new(rentgrid_common::Source::Openrent, "1")
            .price_pcm(2000)
            .bedrooms(2)
            .postcode(Some("E8 3RH"))
            .build();
        assert_eq!(
            gate_check(&listing, &criteria(), &outcodes(), OutcodeMode::Strict),
            GateVerdict::Accept
        );
    }

    #[test]
    fn rejects_out_of_budget() {
        let listing = ListingBuilder::new(rentgrid_common::Source::Openrent, "1")
            .price_pcm(5000)
            .postcode(Some("E8 3RH"))
            .build();
        assert_eq!(
            gate_check(&listing, &criteria(), &outcodes(), OutcodeMode::Strict),
            GateVerdict::RejectPrice
        );
    }

    #[test]
    fn rejects_wrong_bedroom_count() {
        let listing = ListingBuilder::new(rentgrid_common::Source::Openrent, "1")
            .bedrooms(5)
            .postcode(Some("E8 3RH"))
            .build();
        assert_eq!(
            gate_check(&listing, &criteria(), &outcodes(), OutcodeMode::Strict),
            GateVerdict::RejectBedrooms
        );
    }

    #[test]
    fn rejects_outcode_not_in_search_areas() {
        let listing = ListingBuilder::new(rentgrid_common::Source::Openrent, "1")
            .postcode(Some("SW1A 1AA"))
            .build();
        assert_eq!(
            gate_check(&listing, &criteria(), &outcodes(), OutcodeMode::Strict),
            GateVerdict::RejectLocation
        );
    }

    #[test]
    fn strict_mode_rejects_missing_postcode() {
        let listing = ListingBuilder::new(rentgrid_common::Source::Openrent, "1")
            .postcode(None)
            .build();
        assert_eq!(
            gate_check(&listing, &criteria(), &outcodes(), OutcodeMode::Strict),
            GateVerdict::RejectLocation
        );
    }

    #[test]
    fn lenient_mode_accepts_missing_postcode() {
        let listing = ListingBuilder::new(rentgrid_common::Source::Openrent, "1")
            .postcode(None)
            .build();
        assert_eq!(
            gate_check(&listing, &criteria(), &outcodes(), OutcodeMode::Lenient),
            GateVerdict::Accept
        );
    }

    #[test]
    fn batch_filter_tallies_every_rejection_reason() {
        let listings = vec![
            ListingBuilder::new(rentgrid_common::Source::Openrent, "1")
                .postcode(Some("E8 3RH"))
                .build(),
            ListingBuilder::new(rentgrid_common::Source::Openrent, "2")
                .price_pcm(9000)
                .postcode(Some("E8 3RH"))
                .build(),
            ListingBuilder::new(rentgrid_common::Source::Openrent, "3")
                .bedrooms(9)
                .postcode(Some("E8 3RH"))
                .build(),
            ListingBuilder::new(rentgrid_common::Source::Openrent, "4")
                .postcode(Some("SW1A 1AA"))
                .build(),
        ];
        let (accepted, stats) = filter_listings(listings, &criteria(), &outcodes(), OutcodeMode::Strict);
        assert_eq!(accepted.len(), 1);
        assert_eq!(stats.passed, 1);
        assert_eq!(stats.rejected_price, 1);
        assert_eq!(stats.rejected_bedrooms, 1);
        assert_eq!(stats.rejected_location, 1);
    }
}
