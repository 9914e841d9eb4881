use std::collections::BTreeMap;

use proptest::prelude::*;
use proptest::test_runner::Config;

use cmorkit::attributes::{Cmip7GlobalAttributes, GlobalAttributes, RequiredAttribute};
use cmorkit::bounds::calculate_bounds_1d;
use cmorkit::cv::ControlledVocabularies;
use cmorkit::domain::{CompoundName, SchemaVersion, VariantLabel, build_compound_name, parse_compound_name};
use cmorkit::rule::Rule;

fn segment() -> impl Strategy<Value = String> {
    "[A-Za-z0-9-]{1,16}"
}

fn increasing_points() -> impl Strategy<Value = Vec<f64>> {
    (
        -1000.0_f64..1000.0,
        prop::collection::vec(0.01_f64..500.0, 2..64),
    )
        .prop_map(|(start, steps)| {
            let mut points = Vec::with_capacity(steps.len() + 1);
            points.push(start);
            for step in steps {
                let last = points[points.len() - 1];
                points.push(last + step);
            }
            points
        })
}

proptest! {
    #![proptest_config(Config::with_cases(128))]

    #[test]
    fn compound_name_parse_build_roundtrip(
        realm in segment(),
        variable in segment(),
        branding in segment(),
        frequency in segment(),
        region in segment(),
    ) {
        let built = build_compound_name(&realm, &variable, &branding, &frequency, &region);
        let parsed = parse_compound_name(&built).expect("compound name parse");
        prop_assert_eq!(&parsed.variable, &variable);
        prop_assert_eq!(&parsed.region, &region);
        prop_assert_eq!(parsed.to_string(), built);
    }

    #[test]
    fn compound_name_rejects_wrong_arity(parts in prop::collection::vec(segment(), 1..10)) {
        prop_assume!(parts.len() != 5);
        prop_assert!(parts.join(".").parse::<CompoundName>().is_err());
    }

    #[test]
    fn variant_label_indices(r in 1_u32..500, i in 1_u32..50, p in 1_u32..50, f in 1_u32..50) {
        let label: VariantLabel = format!("r{r}i{i}p{p}f{f}").parse().expect("variant label parse");
        prop_assert_eq!(label.realization_index, r);
        prop_assert_eq!(label.initialization_index, i);
        prop_assert_eq!(label.physics_index, p);
        prop_assert_eq!(label.forcing_index, f);
    }

    #[test]
    fn interior_bounds_are_shared_and_cover_points(points in increasing_points()) {
        let bounds = calculate_bounds_1d(&points);
        prop_assert_eq!(bounds.len(), points.len());
        for pair in bounds.windows(2) {
            prop_assert_eq!(pair[0][1], pair[1][0]);
        }
        for (point, [lower, upper]) in points.iter().zip(&bounds) {
            prop_assert!(lower <= point && point <= upper);
        }
    }

    #[test]
    fn cmip7_attribute_set_is_complete(
        source_id in "[A-Z][A-Za-z0-9-]{2,12}",
        institution_id in "[A-Z]{2,8}",
        experiment_id in "[a-z][a-z0-9-]{2,12}",
        r in 1_u32..20,
        realm in prop::sample::select(vec!["atmos", "ocean", "seaIce", "land"]),
        frequency in prop::sample::select(vec!["mon", "day", "3hr", "yr"]),
    ) {
        let compound = build_compound_name(realm, "tas", "tavg-h2m-hxy-u", frequency, "glb");
        let rule = Rule::new()
            .with("source_id", &source_id)
            .with("institution_id", &institution_id)
            .with("experiment_id", &experiment_id)
            .with("activity_id", "CMIP")
            .with("variant_label", &format!("r{r}i1p1f1"))
            .with("grid_label", "gn")
            .with("creation_date", "2025-01-01T00:00:00Z")
            .with("cmor_variable", "tas")
            .with("realm", realm)
            .with("frequency", frequency)
            .with("compound_name", &compound);
        let cv = ControlledVocabularies::from_categories(SchemaVersion::Cmip7, BTreeMap::new());
        let attributes = Cmip7GlobalAttributes::new(None, &cv, &rule);

        let resolved = attributes.global_attributes().expect("global attributes");
        prop_assert_eq!(resolved.len(), RequiredAttribute::ALL.len());
        for attribute in RequiredAttribute::ALL {
            let value = resolved.get(attribute.as_str());
            prop_assert!(value.is_some_and(|value| !value.is_empty()), "{} is empty", attribute);
        }
        prop_assert_eq!(&resolved["realization_index"], &r.to_string());
        prop_assert!(resolved["table_id"].ends_with(frequency));
    }
}
