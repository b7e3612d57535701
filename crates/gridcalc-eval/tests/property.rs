use gridcalc_eval::test_workbook::TestWorkbook;
use gridcalc_common::LiteralValue;
use proptest::prelude::*;

proptest! {
    #[test]
    fn date_components_round_trip(year in 1901i32..=9999, month in 1i64..=12, day in 1i64..=28) {
        let wb = TestWorkbook::new();
        let y = wb.eval_number(&format!("=YEAR(DATE({year},{month},{day}))"));
        let m = wb.eval_number(&format!("=MONTH(DATE({year},{month},{day}))"));
        let d = wb.eval_number(&format!("=DAY(DATE({year},{month},{day}))"));
        prop_assert_eq!((y as i32, m as i64, d as i64), (year, month, day));
    }

    #[test]
    fn month_overflow_normalizes(year in 1950i32..=2050, extra in 1i64..=36) {
        let wb = TestWorkbook::new();
        let normalized = wb.eval(&format!("=DATE({year},{},15)", 12 + extra));
        let expected = wb.eval(&format!(
            "=DATE({},{},15)",
            year as i64 + (11 + extra) / 12,
            (11 + extra) % 12 + 1
        ));
        prop_assert_eq!(normalized, expected);
    }

    #[test]
    fn time_fraction_round_trips(h in 0i64..24, m in 0i64..60, s in 0i64..60) {
        let wb = TestWorkbook::new();
        let hh = wb.eval_number(&format!("=HOUR(TIME({h},{m},{s}))"));
        let mm = wb.eval_number(&format!("=MINUTE(TIME({h},{m},{s}))"));
        let ss = wb.eval_number(&format!("=SECOND(TIME({h},{m},{s}))"));
        prop_assert_eq!((hh as i64, mm as i64, ss as i64), (h, m, s));
    }

    #[test]
    fn beta_inverse_recovers_x(x in 0.02f64..0.98, alpha in 0.5f64..8.0, beta in 0.5f64..8.0) {
        let wb = TestWorkbook::new();
        let p = wb.eval_number(&format!("=BETA.DIST({x},{alpha},{beta},TRUE)"));
        prop_assume!(p > 1e-9 && p < 1.0);
        let back = wb.eval_number(&format!("=BETA.INV({p},{alpha},{beta})"));
        prop_assert!((back - x).abs() < 1e-6, "x={x} p={p} back={back}");
    }

    #[test]
    fn t_inverse_recovers_x(x in -4.0f64..4.0, df in 1i64..40) {
        let wb = TestWorkbook::new();
        let p = wb.eval_number(&format!("=T.DIST({x},{df},TRUE)"));
        prop_assume!(p > 1e-9 && p < 1.0 - 1e-9);
        let back = wb.eval_number(&format!("=T.INV({p},{df})"));
        prop_assert!((back - x).abs() < 1e-5, "x={x} p={p} back={back}");
    }

    #[test]
    fn rate_inverts_nper(rate in 0.001f64..0.2, pv in 100.0f64..100_000.0) {
        let wb = TestWorkbook::new();
        // A payment comfortably above the interest keeps the loan solvable.
        let pmt = -(pv * (rate + 0.05));
        let n = wb.eval_number(&format!("=NPER({rate},{pmt},{pv})"));
        prop_assume!(n.is_finite() && n > 0.5);
        let back = wb.eval_number(&format!("=RATE({n},{pmt},{pv})"));
        prop_assert!((back - rate).abs() < 1e-6, "rate={rate} n={n} back={back}");
    }

    #[test]
    fn irr_zeroes_the_npv(seed in 1i64..500) {
        // Simple two-flow series: invest 1000, receive 1000 + seed.
        let wb = TestWorkbook::new();
        let inflow = 1000 + seed;
        let rate = wb.eval_number(&format!("=IRR({{-1000,{inflow}}})"));
        let npv = -1000.0 + inflow as f64 / (1.0 + rate);
        prop_assert!(npv.abs() < 1e-6, "rate={rate} npv={npv}");
    }

    #[test]
    fn percentile_of_percentrank_is_identity(values in prop::collection::vec(-1000i64..1000, 2..20), pick in 0usize..19) {
        let wb = TestWorkbook::new().with_column(
            "A1",
            &values.iter().map(|v| LiteralValue::Int(*v)).collect::<Vec<_>>(),
        );
        let x = values[pick % values.len()];
        let n = values.len();
        let rank = wb.eval_number(&format!("=PERCENTRANK(A1:A{n},{x},10)"));
        let back = wb.eval_number(&format!("=PERCENTILE(A1:A{n},{rank})"));
        prop_assert!((back - x as f64).abs() < 1e-4, "x={x} rank={rank} back={back}");
    }
}
