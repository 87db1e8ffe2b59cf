use anyhow::Result;
use results_sqlite::ResultRow;
use std::io::Write;

/// One JSON object per line.
pub fn write_jsonl<W: Write>(rows: &[ResultRow], mut w: W) -> Result<()> {
    for r in rows {
        writeln!(w, "{}", serde_json::to_string(r)?)?;
    }
    w.flush()?;
    Ok(())
}

pub fn write_csv<W: Write>(rows: &[ResultRow], w: W) -> Result<()> {
    let mut wtr = csv::Writer::from_writer(w);
    wtr.write_record(["ip", "discovered_at", "available", "anonymous", "ftps", "stream", "recorded_at"])?;
    let flag = |v: Option<bool>| v.map(|b| b.to_string()).unwrap_or_default();
    for r in rows {
        wtr.write_record([
            r.ip.as_str(),
            r.discovered_at.as_deref().unwrap_or(""),
            &flag(r.available),
            &flag(r.anonymous),
            &flag(r.ftps),
            r.stream.as_deref().unwrap_or(""),
            r.recorded_at.as_deref().unwrap_or(""),
        ])?;
    }
    wtr.flush()?;
    Ok(())
}
