use csv_core::{ReadFieldResult, ReaderBuilder};
use lasso::{Rodeo, RodeoResolver};
use pcalg::*;
use std::collections::HashMap;
use std::io;
use std::str;

/// Reads a TSV dataset: a header row of variable names, then one row per sample. Each field is a
/// state label; an empty field is a missing value. Labels are mapped to dense state indices per
/// column, so domains are inferred from the observed values.
fn load_data<I: io::Read, V: VariableId + Default + lasso::Key>(
    mut input: I,
) -> io::Result<(RodeoResolver<V>, Dataset<V>)> {
    let mut inputbuf = [0; 16384];
    let mut fieldbuf = [0; 1024];
    let mut fieldlen = 0;
    let mut header: Vec<V> = Vec::new();
    let mut in_header = true;
    let mut labels: Vec<HashMap<String, u32>> = Vec::new();
    let mut columns: Vec<Vec<Option<u32>>> = Vec::new();
    let mut field_idx = 0;
    let mut rodeo = Rodeo::new();
    let mut tsv = ReaderBuilder::new().delimiter(b'\t').build();

    loop {
        let read = input.read(&mut inputbuf)?;
        let mut bytes = &inputbuf[..read];
        loop {
            let (result, nin, nout) = tsv.read_field(bytes, &mut fieldbuf[fieldlen..]);
            bytes = &bytes[nin..];
            fieldlen += nout;
            match result {
                ReadFieldResult::InputEmpty => break,
                ReadFieldResult::OutputFull => {
                    return Err(io::Error::new(
                        io::ErrorKind::InvalidData,
                        format!("field too long on line {}", tsv.line()),
                    ));
                }
                ReadFieldResult::Field { record_end } => {
                    let field = str::from_utf8(&fieldbuf[..fieldlen])
                        .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
                    fieldlen = 0;

                    if in_header {
                        header.push(rodeo.get_or_intern(field));
                    } else {
                        if field_idx >= header.len() {
                            return Err(io::Error::new(
                                io::ErrorKind::InvalidData,
                                format!("row wider than header on line {}", tsv.line()),
                            ));
                        }
                        let value = if field.is_empty() {
                            None
                        } else {
                            let states = &mut labels[field_idx];
                            let next = states.len() as u32;
                            Some(*states.entry(field.to_owned()).or_insert(next))
                        };
                        columns[field_idx].push(value);
                        field_idx += 1;
                    }

                    if record_end {
                        if in_header {
                            in_header = false;
                            labels.resize_with(header.len(), HashMap::new);
                            columns.resize_with(header.len(), Vec::new);
                        } else {
                            if field_idx != header.len() {
                                return Err(io::Error::new(
                                    io::ErrorKind::InvalidData,
                                    format!(
                                        "row has {} fields, expected {} (line {})",
                                        field_idx,
                                        header.len(),
                                        tsv.line()
                                    ),
                                ));
                            }
                            field_idx = 0;
                        }
                    }
                }
                ReadFieldResult::End => {
                    let mut data = Dataset::new();
                    for (id, column) in header.into_iter().zip(columns) {
                        data.add_column(id, None, column)
                            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
                    }
                    return Ok((rodeo.into_resolver(), data));
                }
            }
        }
    }
}

fn main() -> io::Result<()> {
    tracing_subscriber::fmt::init();

    let (resolver, data) = load_data::<_, lasso::MiniSpur>(io::stdin().lock())?;
    println!(
        "loaded {} rows over {} variables",
        data.rows(),
        data.variables().len()
    );

    let estimator = PcEstimator::new(&data);
    let pdag = estimator
        .estimate()
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;

    for (a, b) in pdag.edges() {
        if pdag.is_undirected(a, b) {
            // Both directions are in the edge list; print the undirected edge once.
            if a < b {
                println!("{} -- {}", resolver.resolve(&a), resolver.resolve(&b));
            }
        } else {
            println!("{} -> {}", resolver.resolve(&a), resolver.resolve(&b));
        }
    }

    Ok(())
}
