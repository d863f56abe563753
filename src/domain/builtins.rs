//! Built-in expression functions.
//!
//! Series functions only look at trading days (volume > 0), so forward-filled
//! placeholder rows never move an average or an extreme.

use crate::domain::block::{BlockStatus, MAX_SPOTS};
use crate::domain::context::Context;
use crate::domain::error::RegistryError;
use crate::domain::registry::{
    FunctionCategory, FunctionRegistry, FunctionSpec, ParamKind, ParamSpec,
};
use crate::domain::stock::Stock;
use crate::domain::value::Value;

/// Calls to these functions make an exit condition existence-based.
pub const EXISTENCE_FUNCTIONS: [&str; 1] = ["exists"];

pub fn register_all(registry: &mut FunctionRegistry) -> Result<(), RegistryError> {
    use FunctionCategory::*;
    use ParamKind::*;

    let block_id = || ParamSpec::required("block_id", Text);
    let window = || ParamSpec::required("n", Integer);

    let specs = vec![
        FunctionSpec::new(
            "exists",
            exists,
            Existence,
            "True while the named block has an ACTIVE instance",
            vec![block_id()],
        ),
        FunctionSpec::new(
            "is_completed",
            is_completed,
            Existence,
            "True once the named block's latest instance has completed",
            vec![block_id()],
        ),
        FunctionSpec::new(
            "block_age",
            block_age,
            Block,
            "Calendar days since the named block started",
            vec![block_id()],
        ),
        FunctionSpec::new(
            "spot_count",
            spot_count,
            Block,
            "Number of spots folded into the named block",
            vec![block_id()],
        ),
        FunctionSpec::new(
            "peak_price",
            peak_price,
            Block,
            "Highest high seen by the named block",
            vec![block_id()],
        ),
        FunctionSpec::new(
            "is_spot_candidate",
            is_spot_candidate,
            Spot,
            "True if the named block is ACTIVE and can take another spot; \
             optional offsets declare the retrospective scan range",
            vec![
                block_id(),
                ParamSpec::optional("nearest", Integer),
                ParamSpec::optional("farthest", Integer),
            ],
        ),
        FunctionSpec::new("abs", abs, Math, "Absolute value", vec![ParamSpec::required("x", Number)]),
        FunctionSpec::new(
            "min",
            min,
            Math,
            "Smallest argument",
            vec![ParamSpec::required("a", Number), ParamSpec::required("b", Number)],
        )
        .variadic(),
        FunctionSpec::new(
            "max",
            max,
            Math,
            "Largest argument",
            vec![ParamSpec::required("a", Number), ParamSpec::required("b", Number)],
        )
        .variadic(),
        FunctionSpec::new(
            "round",
            round,
            Math,
            "Round half to even; returns an int without ndigits",
            vec![
                ParamSpec::required("x", Number),
                ParamSpec::optional("ndigits", Integer),
            ],
        ),
        FunctionSpec::new(
            "pct_change",
            pct_change,
            Price,
            "(a - b) / b * 100",
            vec![ParamSpec::required("a", Number), ParamSpec::required("b", Number)],
        ),
        FunctionSpec::new(
            "change_pct",
            change_pct,
            Price,
            "Percent change of current close against prev close",
            vec![],
        ),
        FunctionSpec::new(
            "gap_pct",
            gap_pct,
            Price,
            "Percent gap of current open against prev close",
            vec![],
        ),
        FunctionSpec::new(
            "ma",
            ma,
            Series,
            "Mean close of the last n trading days including today",
            vec![window()],
        ),
        FunctionSpec::new(
            "avg_volume",
            avg_volume,
            Series,
            "Mean volume of up to n trading days before today",
            vec![window()],
        ),
        FunctionSpec::new(
            "highest_high",
            highest_high,
            Series,
            "Highest high of up to n trading days before today",
            vec![window()],
        ),
        FunctionSpec::new(
            "lowest_low",
            lowest_low,
            Series,
            "Lowest low of up to n trading days before today",
            vec![window()],
        ),
        FunctionSpec::new(
            "volume_ratio",
            volume_ratio,
            Series,
            "Today's volume over avg_volume(n)",
            vec![window()],
        ),
    ];

    for spec in specs {
        registry.register(spec)?;
    }
    Ok(())
}

fn arg<'v, 'a>(args: &'v [Value<'a>], index: usize, name: &str) -> Result<&'v Value<'a>, String> {
    args.get(index)
        .ok_or_else(|| format!("missing argument '{}'", name))
}

fn text_arg<'v>(args: &'v [Value<'_>], index: usize, name: &str) -> Result<&'v str, String> {
    let value = arg(args, index, name)?;
    value
        .as_str()
        .ok_or_else(|| format!("'{}' must be a string, got {}", name, value.type_name()))
}

fn num_arg(args: &[Value<'_>], index: usize, name: &str) -> Result<f64, String> {
    let value = arg(args, index, name)?;
    value
        .as_f64()
        .ok_or_else(|| format!("'{}' must be a number, got {}", name, value.type_name()))
}

fn window_arg(args: &[Value<'_>], index: usize) -> Result<usize, String> {
    let value = arg(args, index, "n")?;
    match value.as_int() {
        Some(n) if n > 0 => Ok(n as usize),
        _ => Err(format!("'n' must be a positive integer, got {}", value)),
    }
}

/// Up to `n` trading days before `current`, oldest first.
fn prior_trading_days<'a>(ctx: &Context<'a>, n: usize) -> Vec<&'a Stock> {
    let history = ctx.history();
    let before = &history[..history.len().saturating_sub(1)];
    let mut days: Vec<&'a Stock> = before
        .iter()
        .rev()
        .filter(|s| s.is_trading_day())
        .take(n)
        .collect();
    days.reverse();
    days
}

fn exists<'a>(args: &[Value<'a>], ctx: &Context<'a>) -> Result<Value<'a>, String> {
    let id = text_arg(args, 0, "block_id")?;
    Ok(Value::Bool(ctx.block(id).is_some_and(|b| b.is_active())))
}

fn is_completed<'a>(args: &[Value<'a>], ctx: &Context<'a>) -> Result<Value<'a>, String> {
    let id = text_arg(args, 0, "block_id")?;
    Ok(Value::Bool(
        ctx.block(id)
            .is_some_and(|b| b.status == BlockStatus::Completed),
    ))
}

fn block_age<'a>(args: &[Value<'a>], ctx: &Context<'a>) -> Result<Value<'a>, String> {
    let id = text_arg(args, 0, "block_id")?;
    Ok(ctx
        .block(id)
        .and_then(|b| b.started_at)
        .map(|start| Value::Int((ctx.current().date - start).num_days()))
        .unwrap_or(Value::None))
}

fn spot_count<'a>(args: &[Value<'a>], ctx: &Context<'a>) -> Result<Value<'a>, String> {
    let id = text_arg(args, 0, "block_id")?;
    Ok(ctx
        .block(id)
        .map(|b| Value::Int(b.spots.len() as i64))
        .unwrap_or(Value::None))
}

fn peak_price<'a>(args: &[Value<'a>], ctx: &Context<'a>) -> Result<Value<'a>, String> {
    let id = text_arg(args, 0, "block_id")?;
    Ok(ctx
        .block(id)
        .map(|b| Value::Float(b.peak_price))
        .unwrap_or(Value::None))
}

fn is_spot_candidate<'a>(args: &[Value<'a>], ctx: &Context<'a>) -> Result<Value<'a>, String> {
    let id = text_arg(args, 0, "block_id")?;
    Ok(Value::Bool(
        ctx.block(id)
            .is_some_and(|b| b.is_active() && b.spots.len() < MAX_SPOTS),
    ))
}

fn abs<'a>(args: &[Value<'a>], _ctx: &Context<'a>) -> Result<Value<'a>, String> {
    match arg(args, 0, "x")? {
        Value::Int(v) => v
            .checked_abs()
            .map(Value::Int)
            .ok_or_else(|| "integer overflow".to_string()),
        _ => Ok(Value::Float(num_arg(args, 0, "x")?.abs())),
    }
}

fn extreme<'a>(args: &[Value<'a>], pick_greater: bool) -> Result<Value<'a>, String> {
    if args.is_empty() {
        return Err("expected at least one argument".to_string());
    }
    let mut best = &args[0];
    let mut best_num = num_arg(args, 0, "a")?;
    for (i, candidate) in args.iter().enumerate().skip(1) {
        let value = num_arg(args, i, "b")?;
        let better = if pick_greater {
            value > best_num
        } else {
            value < best_num
        };
        if better {
            best = candidate;
            best_num = value;
        }
    }
    Ok(best.clone())
}

fn min<'a>(args: &[Value<'a>], _ctx: &Context<'a>) -> Result<Value<'a>, String> {
    extreme(args, false)
}

fn max<'a>(args: &[Value<'a>], _ctx: &Context<'a>) -> Result<Value<'a>, String> {
    extreme(args, true)
}

fn round<'a>(args: &[Value<'a>], _ctx: &Context<'a>) -> Result<Value<'a>, String> {
    let x = num_arg(args, 0, "x")?;
    match args.get(1) {
        None | Some(Value::None) => Ok(Value::Int(x.round_ties_even() as i64)),
        Some(digits) => {
            let digits = digits
                .as_int()
                .ok_or_else(|| format!("'ndigits' must be an integer, got {}", digits))?;
            let scale = 10f64.powi(digits as i32);
            Ok(Value::Float((x * scale).round_ties_even() / scale))
        }
    }
}

fn percent(a: f64, b: f64) -> Result<f64, String> {
    if b == 0.0 {
        return Err("percent change against zero".to_string());
    }
    Ok((a - b) / b * 100.0)
}

fn pct_change<'a>(args: &[Value<'a>], _ctx: &Context<'a>) -> Result<Value<'a>, String> {
    let a = num_arg(args, 0, "a")?;
    let b = num_arg(args, 1, "b")?;
    percent(a, b).map(Value::Float)
}

fn change_pct<'a>(_args: &[Value<'a>], ctx: &Context<'a>) -> Result<Value<'a>, String> {
    match ctx.prev() {
        Some(prev) => percent(ctx.current().close, prev.close).map(Value::Float),
        None => Ok(Value::None),
    }
}

fn gap_pct<'a>(_args: &[Value<'a>], ctx: &Context<'a>) -> Result<Value<'a>, String> {
    match ctx.prev() {
        Some(prev) => percent(ctx.current().open, prev.close).map(Value::Float),
        None => Ok(Value::None),
    }
}

fn ma<'a>(args: &[Value<'a>], ctx: &Context<'a>) -> Result<Value<'a>, String> {
    let n = window_arg(args, 0)?;
    let closes: Vec<f64> = ctx
        .history()
        .iter()
        .rev()
        .filter(|s| s.is_trading_day())
        .take(n)
        .map(|s| s.close)
        .collect();
    if closes.len() < n {
        return Ok(Value::None);
    }
    Ok(Value::Float(closes.iter().sum::<f64>() / n as f64))
}

fn mean_volume(ctx: &Context<'_>, n: usize) -> Option<f64> {
    let days = prior_trading_days(ctx, n);
    if days.is_empty() {
        return None;
    }
    Some(days.iter().map(|s| s.volume as f64).sum::<f64>() / days.len() as f64)
}

fn avg_volume<'a>(args: &[Value<'a>], ctx: &Context<'a>) -> Result<Value<'a>, String> {
    let n = window_arg(args, 0)?;
    Ok(Value::from_f64_option(mean_volume(ctx, n)))
}

fn highest_high<'a>(args: &[Value<'a>], ctx: &Context<'a>) -> Result<Value<'a>, String> {
    let n = window_arg(args, 0)?;
    let high = prior_trading_days(ctx, n)
        .iter()
        .map(|s| s.high)
        .fold(None, |acc: Option<f64>, h| Some(acc.map_or(h, |a| a.max(h))));
    Ok(Value::from_f64_option(high))
}

fn lowest_low<'a>(args: &[Value<'a>], ctx: &Context<'a>) -> Result<Value<'a>, String> {
    let n = window_arg(args, 0)?;
    let low = prior_trading_days(ctx, n)
        .iter()
        .map(|s| s.low)
        .fold(None, |acc: Option<f64>, l| Some(acc.map_or(l, |a| a.min(l))));
    Ok(Value::from_f64_option(low))
}

fn volume_ratio<'a>(args: &[Value<'a>], ctx: &Context<'a>) -> Result<Value<'a>, String> {
    let n = window_arg(args, 0)?;
    Ok(match mean_volume(ctx, n) {
        Some(avg) if avg > 0.0 => Value::Float(ctx.current().volume as f64 / avg),
        _ => Value::None,
    })
}
