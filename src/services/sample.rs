// src/services/sample.rs
use chrono::{Duration, NaiveDate};
use rust_decimal::Decimal;

use crate::models::{OfferingRecord, Phase};

struct SampleSpec {
    id: &'static str,
    name: &'static str,
    listing: (i32, u32, u32),
    offer_price: i64,
    band: (i64, i64),
    shares: u64,
    // Tenths of a unit, so 15.5% is 155.
    ratio_tenths: i64,
    holding_tenths: i64,
    float_tenths: i64,
    sector: &'static str,
    sector_return_tenths: i64,
    expected_return_tenths: i64,
    strengths: &'static [&'static str],
    weaknesses: &'static [&'static str],
}

const SAMPLES: &[SampleSpec] = &[
    SampleSpec {
        id: "IPO-2026-0001",
        name: "TechInnovation",
        listing: (2026, 1, 15),
        offer_price: 25000,
        band: (23000, 27000),
        shares: 2_400_000,
        ratio_tenths: 12_505,
        holding_tenths: 155,
        float_tenths: 283,
        sector: "Semiconductors",
        sector_return_tenths: 128,
        expected_return_tenths: 185,
        strengths: &[
            "Mandatory holding of 15.5% is on the high side",
            "Semiconductor sector average return of 12.8% is strong",
            "Offer price sits mid-band",
            "Recent strength in the semiconductor sector",
        ],
        weaknesses: &[
            "Available float of 28.3% is somewhat high",
            "Technology edge over competitors still unproven",
            "Global chip supply volatility",
        ],
    },
    SampleSpec {
        id: "IPO-2026-0002",
        name: "BioHealthcare",
        listing: (2026, 1, 22),
        offer_price: 18000,
        band: (15000, 20000),
        shares: 1_800_000,
        ratio_tenths: 9_802,
        holding_tenths: 220,
        float_tenths: 185,
        sector: "Biotech",
        sector_return_tenths: 152,
        expected_return_tenths: 250,
        strengths: &[
            "Mandatory holding of 22% is very high",
            "Available float of 18.5% keeps supply tight",
            "Biotech sector trending up",
            "Lead pipeline candidate in phase 3 trials",
        ],
        weaknesses: &[
            "Offer price close to the top of the band",
            "Clinical outcome uncertainty",
            "High sector volatility",
        ],
    },
    SampleSpec {
        id: "IPO-2026-0003",
        name: "GreenEnergySolution",
        listing: (2026, 2, 5),
        offer_price: 32000,
        band: (28000, 32000),
        shares: 3_100_000,
        ratio_tenths: 2_100,
        holding_tenths: 85,
        float_tenths: 420,
        sector: "Renewable energy",
        sector_return_tenths: 65,
        expected_return_tenths: 80,
        strengths: &["Expected beneficiary of renewable energy policy", "High export share"],
        weaknesses: &[
            "Mandatory holding of 8.5% is very low",
            "Available float of 42% is excessive",
            "Priced at the top of the band",
            "Raw material cost risk",
        ],
    },
    SampleSpec {
        id: "IPO-2026-0004",
        name: "AIRobotics",
        listing: (2026, 2, 12),
        offer_price: 45000,
        band: (40000, 50000),
        shares: 1_500_000,
        ratio_tenths: 4_503,
        holding_tenths: 180,
        float_tenths: 250,
        sector: "AI/Robotics",
        sector_return_tenths: 32,
        expected_return_tenths: 55,
        strengths: &[
            "Mandatory holding of 18% is high",
            "Available float of 25% is reasonable",
            "Competitive AI technology",
            "Partnerships with large conglomerates",
        ],
        weaknesses: &[
            "Sector average return of 3.2% is low",
            "AI sector currently correcting",
            "Profitability improvements delayed",
        ],
    },
    SampleSpec {
        id: "IPO-2026-0005",
        name: "SmartMobility",
        listing: (2026, 2, 19),
        offer_price: 22000,
        band: (20000, 24000),
        shares: 2_000_000,
        ratio_tenths: 7_300,
        holding_tenths: 125,
        float_tenths: 320,
        sector: "EV/Mobility",
        sector_return_tenths: 95,
        expected_return_tenths: 120,
        strengths: &[
            "Growing EV market",
            "Mandatory holding of 12.5% meets the bar",
            "Available float of 32% meets the bar",
            "Sector return of 9.5% is decent",
        ],
        weaknesses: &[
            "Available float is somewhat high",
            "Intensifying competition",
            "Battery price risk",
        ],
    },
];

fn tenths(value: i64) -> Decimal {
    Decimal::new(value, 1).normalize()
}

/// Built-in offerings used when no upstream feed is configured and by the
/// sample-analysis endpoint. All of them are listed.
pub fn sample_offerings() -> Vec<OfferingRecord> {
    SAMPLES
        .iter()
        .filter_map(|spec| {
            let listing = NaiveDate::from_ymd_opt(spec.listing.0, spec.listing.1, spec.listing.2)?;
            let subscription_end = listing - Duration::days(7);
            let subscription_start = subscription_end - Duration::days(1);
            let offer_price = Decimal::from(spec.offer_price);
            let expected = tenths(spec.expected_return_tenths);

            let mut record = OfferingRecord::announced(
                spec.id,
                spec.name,
                (subscription_start, subscription_end),
                listing,
                (Decimal::from(spec.band.0), Decimal::from(spec.band.1)),
                spec.shares,
            );
            record.phase = Phase::Listed;
            record.final_offer_price = Some(offer_price);
            record.subscription_competition_ratio = Some(tenths(spec.ratio_tenths));
            record.sector = Some(spec.sector.to_string());
            record.mandatory_holding_pct = Some(tenths(spec.holding_tenths));
            record.available_float_pct = Some(tenths(spec.float_tenths));
            record.sector_avg_return_pct = Some(tenths(spec.sector_return_tenths));
            record.expected_return_pct = Some(expected);
            record.reference_price = Some(
                (offer_price * (Decimal::ONE_HUNDRED + expected) / Decimal::ONE_HUNDRED).round_dp(0),
            );
            record.strengths = spec.strengths.iter().map(|s| s.to_string()).collect();
            record.weaknesses = spec.weaknesses.iter().map(|s| s.to_string()).collect();
            Some(record)
        })
        .collect()
}
