//! Geocoded census extracts: one wide row per census block, with demographic breakdowns spread
//! across hundreds of columns. Each row turns into a census block plus its age, household, and
//! income sub-records.

use anyhow::{bail, Result};
use lazy_static::lazy_static;
use regex::Regex;
use serde::Serialize;

use hcme_store::schema::{
    CENSUS_BLOCK, CENSUS_BLOCK_AGE, CENSUS_BLOCK_ECONOMICS, CENSUS_BLOCK_HOUSEHOLD,
};
use hcme_store::{Loader, Store};
use hcme_util::{prettyprint_usize, Timer};

use crate::frame::Row;
use crate::{CsvOptions, Frame};

lazy_static! {
    static ref RE_AGE_COLUMNS: Regex = Regex::new(
        r"^ACS Demographics/Population by age range/(?P<sex>.+): (?P<range>.+) years\w*/Percentage$"
    )
    .unwrap();
    static ref RE_ECONOMICS_COLUMNS: Regex =
        Regex::new(r"^ACS Economics/Household income/(?P<income>.+)/Percentage$").unwrap();
    static ref NUMBER: Regex = Regex::new(r"\d+").unwrap();
    static ref DOLLARS: Regex = Regex::new(r"[\d,]+").unwrap();
}

const FIPS: &str = "Full FIPS (block)";
const TOTAL_POPULATION: &str = "ACS Demographics/Sex/Total/Value";
const TOTAL_HOUSEHOLDS: &str = "ACS Families/Household type by household/Total/Value";
const PCT_MALE: &str = "ACS Demographics/Sex/Male/Percentage";
const PCT_FEMALE: &str = "ACS Demographics/Sex/Female/Percentage";
const PCT_FAMILY: &str = "ACS Families/Household type by household/Family households/Percentage";
const PCT_ALONE: &str =
    "ACS Families/Household type by household/Nonfamily households: Householder living alone/Percentage";

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct CensusBlock {
    pub id: String,
    pub state_code: String,
    pub county_code: String,
    pub tract_code: String,
    pub block_code: String,
    pub total_population: i64,
    pub total_households: i64,
    pub pct_m: f64,
    pub pct_f: f64,
    pub pct_family_household: f64,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct AgeBracket {
    pub block_id: String,
    pub pct: f64,
    pub count: i64,
    pub pct_veteran: f64,
    pub lower_bound: i64,
    pub upper_bound: i64,
    pub sex: String,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct HouseholdTypes {
    pub block_id: String,
    pub pct_family_household: f64,
    pub pct_nonfamily_household: f64,
    pub pct_nonfamily_alone: f64,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct IncomeBracket {
    pub block_id: String,
    pub pct: f64,
    pub household_income_lower_bound: i64,
    pub household_income_upper_bound: i64,
}

/// Everything derived from one row of the extract.
#[derive(Clone, Debug, PartialEq)]
pub struct CensusRecords {
    pub block: CensusBlock,
    pub ages: Vec<AgeBracket>,
    pub households: HouseholdTypes,
    pub incomes: Vec<IncomeBracket>,
}

/// The 15-digit GEOID, zero-padded.
fn block_id(row: &Row) -> Result<String> {
    let id = match row.get(FIPS) {
        serde_json::Value::Number(n) => match n.as_u64() {
            Some(x) => x.to_string(),
            None => bail!("{} isn't a whole number: {}", FIPS, n),
        },
        serde_json::Value::String(s) => s.trim().to_string(),
        other => bail!("Row has no {}: {}", FIPS, other),
    };
    if id.len() > 15 || !id.chars().all(|c| c.is_ascii_digit()) {
        bail!("Invalid census block id {}", id);
    }
    Ok(format!("{:0>15}", id))
}

// Missing values count as 0
fn num(row: &Row, column: &str) -> f64 {
    row.f64(column).unwrap_or(0.0)
}

/// (lower, upper) ages from something like "Under 5", "85 and over", "20", or "25 to 29".
pub fn age_bounds(range: &str) -> Result<(i64, i64)> {
    let numbers: Vec<i64> = NUMBER
        .find_iter(range)
        .filter_map(|m| m.as_str().parse().ok())
        .collect();
    match numbers.as_slice() {
        [bound] => {
            if range.contains("Under") {
                Ok((0, *bound))
            } else if range.contains("and over") {
                Ok((*bound, 100))
            } else {
                Ok((*bound, *bound))
            }
        }
        [lower, upper] => Ok((*lower, *upper)),
        _ => bail!("Invalid age range: {}", range),
    }
}

/// (lower, upper) household income from "Less than $10,000", "$200,000 or more", or
/// "$10,000 to $14,999".
pub fn income_bounds(bracket: &str) -> Result<(i64, i64)> {
    let numbers: Vec<i64> = DOLLARS
        .find_iter(bracket)
        .filter_map(|m| m.as_str().replace(',', "").parse().ok())
        .collect();
    match numbers.as_slice() {
        [bound] => {
            if bracket.contains("Less than") {
                Ok((0, *bound))
            } else if bracket.contains("or more") {
                Ok((*bound, *bound + 50_000))
            } else {
                bail!("Invalid income bracket: {}", bracket)
            }
        }
        [lower, upper] => Ok((*lower, *upper)),
        _ => bail!("Invalid income bracket: {}", bracket),
    }
}

pub fn parse_row(row: Row) -> Result<CensusRecords> {
    let id = block_id(&row)?;
    let pct_family = num(&row, PCT_FAMILY);
    let block = CensusBlock {
        state_code: id[..2].to_string(),
        county_code: id[..5].to_string(),
        tract_code: id[5..11].to_string(),
        block_code: id[11..].to_string(),
        total_population: num(&row, TOTAL_POPULATION) as i64,
        total_households: num(&row, TOTAL_HOUSEHOLDS) as i64,
        pct_m: num(&row, PCT_MALE),
        pct_f: num(&row, PCT_FEMALE),
        pct_family_household: pct_family,
        id: id.clone(),
    };

    let mut ages = Vec::new();
    let mut incomes = Vec::new();
    for column in row.columns() {
        if let Some(caps) = RE_AGE_COLUMNS.captures(column) {
            let sex = match &caps["sex"] {
                "Male" => "M",
                "Female" => "F",
                x => bail!("Unknown sex {} in column {}", x, column),
            };
            let (lower_bound, upper_bound) = age_bounds(&caps["range"])?;
            ages.push(AgeBracket {
                block_id: id.clone(),
                pct: num(&row, column),
                count: num(&row, &column.replace("Percentage", "Value")) as i64,
                pct_veteran: 0.0,
                lower_bound,
                upper_bound,
                sex: sex.to_string(),
            });
        } else if let Some(caps) = RE_ECONOMICS_COLUMNS.captures(column) {
            let (lower, upper) = income_bounds(&caps["income"])?;
            incomes.push(IncomeBracket {
                block_id: id.clone(),
                pct: num(&row, column),
                household_income_lower_bound: lower,
                household_income_upper_bound: upper,
            });
        }
    }

    Ok(CensusRecords {
        households: HouseholdTypes {
            block_id: id,
            pct_family_household: pct_family,
            pct_nonfamily_household: 1.0 - pct_family,
            pct_nonfamily_alone: num(&row, PCT_ALONE),
        },
        block,
        ages,
        incomes,
    })
}

pub fn load_census_blocks(
    store: &Store,
    path: &str,
    batch_size: usize,
    timer: &mut Timer,
) -> Result<usize> {
    timer.start(format!("read {}", path));
    let frame = Frame::read_csv(path, &CsvOptions::default().text(FIPS))?;
    timer.stop(format!("read {}", path));

    let mut blocks = Loader::new(store, &CENSUS_BLOCK, &["id"])?.batch_size(15);
    let mut ages = Loader::new(store, &CENSUS_BLOCK_AGE, &["block_id", "sex", "lower_bound"])?
        .batch_size(batch_size);
    let mut households =
        Loader::new(store, &CENSUS_BLOCK_HOUSEHOLD, &["block_id"])?.batch_size(15);
    let mut incomes = Loader::new(
        store,
        &CENSUS_BLOCK_ECONOMICS,
        &[
            "block_id",
            "household_income_lower_bound",
            "household_income_upper_bound",
        ],
    )?
    .batch_size(batch_size);

    timer.start_iter("parse census blocks", frame.len());
    let mut parsed = Vec::new();
    for row in frame.rows() {
        timer.next();
        parsed.push(parse_row(row)?);
    }

    // Every other table references the blocks, so they go in first
    for records in &parsed {
        blocks.stream_row(&records.block)?;
    }
    let n = blocks.finish()?;
    for records in &parsed {
        households.stream_row(&records.households)?;
        for age in &records.ages {
            ages.stream_row(age)?;
        }
        for income in &records.incomes {
            incomes.stream_row(income)?;
        }
    }
    ages.finish()?;
    households.finish()?;
    incomes.finish()?;
    timer.note(format!("Loaded {} census blocks", prettyprint_usize(n)));
    Ok(n)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bounds() {
        assert_eq!((0, 5), age_bounds("Under 5").unwrap());
        assert_eq!((85, 100), age_bounds("85 and over").unwrap());
        assert_eq!((20, 20), age_bounds("20").unwrap());
        assert_eq!((25, 29), age_bounds("25 to 29").unwrap());
        assert!(age_bounds("adults").is_err());

        assert_eq!((0, 10000), income_bounds("Less than $10,000").unwrap());
        assert_eq!((200000, 250000), income_bounds("$200,000 or more").unwrap());
        assert_eq!((10000, 14999), income_bounds("$10,000 to $14,999").unwrap());
        assert!(income_bounds("$50,000").is_err());
    }

    fn extract() -> String {
        let columns = vec![
            FIPS.to_string(),
            TOTAL_POPULATION.to_string(),
            TOTAL_HOUSEHOLDS.to_string(),
            PCT_MALE.to_string(),
            PCT_FEMALE.to_string(),
            PCT_FAMILY.to_string(),
            PCT_ALONE.to_string(),
            "ACS Demographics/Population by age range/Male: Under 5 years/Percentage".to_string(),
            "ACS Demographics/Population by age range/Male: Under 5 years/Value".to_string(),
            "ACS Demographics/Population by age range/Female: 85 and over years/Percentage"
                .to_string(),
            "ACS Economics/Household income/Less than $10,000/Percentage".to_string(),
            "ACS Economics/Household income/$10,000 to $14,999/Percentage".to_string(),
        ];
        let header = columns
            .iter()
            .map(|c| format!("\"{}\"", c))
            .collect::<Vec<_>>()
            .join(",");
        format!(
            "{}\n60230001001000,120,40,0.45,0.55,0.6,0.25,0.05,6,0.02,0.3,0.7\n",
            header
        )
    }

    #[test]
    fn test_parse_row() {
        let frame =
            Frame::from_reader(extract().as_bytes(), &CsvOptions::default().text(FIPS)).unwrap();
        let records = parse_row(frame.rows().next().unwrap()).unwrap();

        assert_eq!("060230001001000", records.block.id);
        assert_eq!("06", records.block.state_code);
        assert_eq!("06023", records.block.county_code);
        assert_eq!("000100", records.block.tract_code);
        assert_eq!("1000", records.block.block_code);
        assert_eq!(120, records.block.total_population);

        assert_eq!(2, records.ages.len());
        assert_eq!(("M".to_string(), 0, 5, 6), {
            let a = &records.ages[0];
            (a.sex.clone(), a.lower_bound, a.upper_bound, a.count)
        });
        // No matching Value column
        assert_eq!(0, records.ages[1].count);
        assert_eq!((85, 100), (records.ages[1].lower_bound, records.ages[1].upper_bound));

        assert!((records.households.pct_nonfamily_household - 0.4).abs() < 1e-9);
        assert_eq!(2, records.incomes.len());
        assert_eq!(14999, records.incomes[1].household_income_upper_bound);
    }

    #[test]
    fn test_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("census.csv");
        fs_err::write(&path, extract()).unwrap();

        let store = Store::open_in_memory().unwrap();
        store.create_schema().unwrap();
        let path = path.display().to_string();
        for _ in 0..2 {
            assert_eq!(
                1,
                load_census_blocks(&store, &path, 100, &mut Timer::throwaway()).unwrap()
            );
        }
        assert_eq!(2, store.count(&CENSUS_BLOCK_AGE).unwrap());
        assert_eq!(2, store.income_brackets("060230001001000").unwrap().len());
    }
}
