//! Human-readable summaries printed to stdout once a command finishes.

use order_core::{OrderHandle, OrderRequest};
use order_engine::{
    GridPlan, GridReport, OcoOutcome, OcoPlan, OcoReport, Outcome, Plan, TwapPlan, TwapReport,
};
use std::time::Duration;

pub fn print_outcome(outcome: &Outcome) {
    for line in render_outcome(outcome) {
        println!("{}", line);
    }
}

fn render_outcome(outcome: &Outcome) -> Vec<String> {
    match outcome {
        Outcome::DryRun(plan) => {
            let mut lines = vec!["DRY RUN: validated, nothing submitted".to_string()];
            lines.extend(render_plan(plan));
            lines
        }
        Outcome::Placed(handle) => vec![describe_handle(handle)],
        Outcome::Oco(report) => render_oco(report),
        Outcome::Twap(report) => render_twap(report),
        Outcome::Grid(report) => render_grid(report),
    }
}

fn render_plan(plan: &Plan) -> Vec<String> {
    match plan {
        Plan::Single(request) => vec![format!("  {}", describe_request(request))],
        Plan::Oco(plan) => render_oco_plan(plan),
        Plan::Twap(plan) => render_twap_plan(plan),
        Plan::Grid(plan) => render_grid_plan(plan),
    }
}

/// `LIMIT BUY 0.01 BTCUSDT @ 45000 GTC reduce-only`
pub fn describe_request(request: &OrderRequest) -> String {
    let mut text = format!(
        "{} {} {} {}",
        request.order_type, request.side, request.quantity, request.symbol
    );
    if let Some(stop) = request.stop_price {
        text.push_str(&format!(" stop {}", stop));
    }
    if let Some(price) = request.price {
        text.push_str(&format!(" @ {}", price));
    }
    if let Some(tif) = request.time_in_force {
        text.push(' ');
        text.push_str(tif.as_binance_str());
    }
    if request.reduce_only {
        text.push_str(" reduce-only");
    }
    text
}

fn describe_handle(handle: &OrderHandle) -> String {
    let mut text = format!(
        "order {} {}: {}",
        handle.exchange_order_id,
        handle.status(),
        describe_request(&handle.request)
    );
    if !handle.filled_qty.is_zero() {
        text.push_str(&format!(" (filled {}", handle.filled_qty));
        if let Some(avg) = handle.avg_price {
            text.push_str(&format!(" avg {}", avg));
        }
        text.push(')');
    }
    text
}

fn render_oco_plan(plan: &OcoPlan) -> Vec<String> {
    vec![
        format!("  take profit: {}", describe_request(&plan.take_profit)),
        format!("  stop loss:   {}", describe_request(&plan.stop_loss)),
    ]
}

fn render_oco(report: &OcoReport) -> Vec<String> {
    let headline = match &report.outcome {
        OcoOutcome::TakeProfitFilled => "OCO resolved: take profit filled".to_string(),
        OcoOutcome::StopLossFilled => "OCO resolved: stop loss filled".to_string(),
        OcoOutcome::BothFilled => "OCO: BOTH legs filled, check your position".to_string(),
        OcoOutcome::NoExecution => "OCO ended: both legs closed without a fill".to_string(),
        OcoOutcome::TimedOut { legs_canceled: true } => {
            "OCO monitoring timed out: open legs canceled".to_string()
        }
        OcoOutcome::TimedOut { legs_canceled: false } => {
            "OCO monitoring timed out: legs left open".to_string()
        }
        OcoOutcome::QueryFailed(e) => format!("OCO monitoring stopped: {}", e),
        OcoOutcome::Interrupted => "OCO monitoring interrupted".to_string(),
    };

    let mut lines = vec![
        headline,
        format!("  take profit: {}", describe_handle(&report.pair.take_profit)),
        format!("  stop loss:   {}", describe_handle(&report.pair.stop_loss)),
        format!(
            "  {} polls in {}, final state {:?}",
            report.polls,
            format_duration(report.elapsed),
            report.state
        ),
    ];
    if let Some(e) = &report.cancel_failure {
        lines.push(format!("  WARNING: cancel of the other leg failed: {}", e));
    }
    let open = report.pair.open_order_ids();
    if !open.is_empty() {
        lines.push(format!("  still open on the exchange: {}", open.join(", ")));
    }
    lines
}

fn render_twap_plan(plan: &TwapPlan) -> Vec<String> {
    let mut lines = vec![format!(
        "  TWAP {} {} {} in {} slices over {} (every {})",
        plan.side,
        plan.total_quantity,
        plan.symbol,
        plan.slice_count,
        format_duration(plan.duration),
        format_duration(plan.interval)
    )];
    lines.extend(plan.slices.iter().map(|slice| {
        format!(
            "  #{:<3} +{:<8} {}",
            slice.index,
            format_duration(slice.offset),
            describe_request(&slice.request)
        )
    }));
    lines
}

fn render_twap(report: &TwapReport) -> Vec<String> {
    let mut lines = vec![format!(
        "TWAP {:?}: {}/{} slices submitted{}",
        report.status(),
        report.successful(),
        report.slice_count,
        if report.interrupted { " (interrupted)" } else { "" }
    )];
    lines.push(format!(
        "  requested {}, submitted {}, executed {}",
        report.requested_quantity,
        report.submitted_quantity(),
        report.executed_quantity()
    ));
    if let Some(avg) = report.average_price() {
        lines.push(format!("  average fill price {}", avg));
    }
    lines.push(format!("  elapsed {}", format_duration(report.elapsed)));
    for failure in report.failures() {
        if let Err(e) = &failure.result {
            lines.push(format!(
                "  slice #{} ({}) failed: {}",
                failure.index, failure.quantity, e
            ));
        }
    }
    lines
}

fn render_grid_plan(plan: &GridPlan) -> Vec<String> {
    let mut lines = vec![format!(
        "  GRID {} {} levels {}..{} reference {}, {} placeable",
        plan.symbol,
        plan.level_count,
        plan.lower_price,
        plan.upper_price,
        plan.reference_price,
        plan.placeable_levels()
    )];
    lines.extend(plan.levels.iter().map(|level| match &level.order {
        Ok(request) => format!("  L{:<3} {}", level.index, describe_request(request)),
        Err(e) => format!("  L{:<3} {} skipped: {}", level.index, level.price, e),
    }));
    lines
}

fn render_grid(report: &GridReport) -> Vec<String> {
    let mut lines = vec![format!(
        "GRID {:?}: {}/{} levels placed{}",
        report.status(),
        report.placed().count(),
        report.level_count,
        if report.interrupted { " (interrupted)" } else { "" }
    )];
    lines.extend(report.placements.iter().map(|placement| {
        let side = placement
            .side
            .map_or_else(|| "-".to_string(), |side| side.to_string());
        match &placement.result {
            Ok(handle) => format!(
                "  L{:<3} {} {:<4} order {}",
                placement.level_index, placement.price, side, handle.exchange_order_id
            ),
            Err(e) => format!(
                "  L{:<3} {} {:<4} {}",
                placement.level_index, placement.price, side, e
            ),
        }
    }));
    lines
}

fn format_duration(duration: Duration) -> String {
    let secs = duration.as_secs();
    if secs >= 60 {
        format!("{}m{:02}s", secs / 60, secs % 60)
    } else {
        format!("{}s", secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use order_core::{OrderSide, OrderStatus, TimeInForce};
    use rust_decimal_macros::dec;

    #[test]
    fn test_describe_request() {
        let limit = OrderRequest::limit("BTCUSDT", OrderSide::Buy, dec!(0.01), dec!(45000))
            .with_time_in_force(TimeInForce::GTC)
            .reduce_only();
        assert_eq!(
            describe_request(&limit),
            "LIMIT BUY 0.01 BTCUSDT @ 45000 GTC reduce-only"
        );

        let stop = OrderRequest::stop_market("BTCUSDT", OrderSide::Sell, dec!(0.01), dec!(44000));
        assert!(describe_request(&stop).contains("stop 44000"));
    }

    #[test]
    fn test_handle_shows_fill() {
        let request = OrderRequest::market("ETHUSDT", OrderSide::Sell, dec!(1));
        let handle = OrderHandle::new("42", request, OrderStatus::Filled, 0)
            .with_fill(dec!(1), Some(dec!(2500.5)));
        let text = describe_handle(&handle);
        assert!(text.starts_with("order 42 FILLED"));
        assert!(text.ends_with("(filled 1 avg 2500.5)"));
    }

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(Duration::from_secs(45)), "45s");
        assert_eq!(format_duration(Duration::from_secs(125)), "2m05s");
    }
}
