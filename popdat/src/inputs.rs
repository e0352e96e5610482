//! Everything the simulator needs to know about the synthetic population: plans, households,
//! vehicles, and per-object attributes. Coordinates are written in UTM zone 10.

use std::io::{BufWriter, Write};

use anyhow::Result;
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::Writer;
use rand::Rng;
use rand_distr::{Binomial, Distribution};
use rand_xorshift::XorShiftRng;

use geom::{LonLat, Utm, UtmPt};
use hcme_io::Artifacts;
use hcme_store::{HouseholdMembers, PlanLeg, Store};
use hcme_util::{prettyprint_usize, Timer};

use crate::sampling::{choose_weighted, rng};

/// Used when the household's census block has no income distribution.
pub const COUNTY_MEDIAN_INCOME: f64 = 40_000.0;
pub const VEHICLE_TYPE: &str = "beamVilleCar";

#[derive(Clone, Debug, PartialEq)]
pub struct Activity {
    pub home: bool,
    pub pt: UtmPt,
    /// Seconds after midnight. The last activity of the day doesn't end.
    pub end_time: Option<f64>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct PersonPlan {
    pub person_id: i64,
    pub activities: Vec<Activity>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct HouseholdInput {
    pub id: i64,
    /// Sorted by id
    pub members: Vec<i64>,
    pub vehicles: Vec<String>,
    pub income: f64,
    pub home: UtmPt,
}

/// Formats seconds after midnight as `HH:MM:SS`. Hours keep counting past midnight.
pub fn hms(seconds: f64) -> String {
    let total = seconds.max(0.0).floor() as u64;
    format!(
        "{:02}:{:02}:{:02}",
        total / 3600,
        (total % 3600) / 60,
        total % 60
    )
}

fn project(utm: &Utm, (lon, lat): (f64, f64)) -> Result<UtmPt> {
    utm.project(LonLat::new(lon, lat))
}

/// Legs must be ordered by person and leg, like `Store::plan_legs` returns them.
pub fn person_plans(utm: &Utm, legs: &[PlanLeg]) -> Result<Vec<PersonPlan>> {
    let mut plans: Vec<PersonPlan> = Vec::new();
    let mut last_leg: Option<&PlanLeg> = None;

    for leg in legs {
        if last_leg.map(|l| l.person_id) != Some(leg.person_id) {
            if let (Some(prev), Some(plan)) = (last_leg, plans.last_mut()) {
                plan.activities.push(final_activity(utm, prev)?);
            }
            plans.push(PersonPlan {
                person_id: leg.person_id,
                activities: Vec::new(),
            });
        }
        if let Some(plan) = plans.last_mut() {
            plan.activities.push(Activity {
                home: leg.origin_location_id == leg.home_location_id,
                pt: project(utm, leg.origin)?,
                end_time: Some(leg.departure),
            });
        }
        last_leg = Some(leg);
    }
    if let (Some(prev), Some(plan)) = (last_leg, plans.last_mut()) {
        plan.activities.push(final_activity(utm, prev)?);
    }
    Ok(plans)
}

fn final_activity(utm: &Utm, leg: &PlanLeg) -> Result<Activity> {
    Ok(Activity {
        home: leg.destination_location_id == leg.home_location_id,
        pt: project(utm, leg.destination)?,
        end_time: None,
    })
}

/// Vehicles and income are reproducible per household: both are sampled from RNGs seeded by the
/// household id.
pub fn household_input(
    store: &Store,
    utm: &Utm,
    household: &HouseholdMembers,
    pct_vehicle_ownership: f64,
) -> Result<HouseholdInput> {
    let mut vehicle_rng = rng(household.household_id as u64);
    let num_vehicles = Binomial::new(household.members.len() as u64, pct_vehicle_ownership)?
        .sample(&mut vehicle_rng);

    let brackets = match household.census_block_geoid {
        Some(ref geoid) => store.income_brackets(geoid)?,
        None => Vec::new(),
    };
    let mut income_rng = rng(household.household_id as u64);
    let income = sample_income(&brackets, &mut income_rng)?;

    Ok(HouseholdInput {
        id: household.household_id,
        members: household.members.clone(),
        vehicles: (0..num_vehicles)
            .map(|i| format!("{}-{}", household.household_id, i))
            .collect(),
        income,
        home: project(utm, household.home)?,
    })
}

/// Picks a bracket weighted by its share, then a uniform income inside it.
pub fn sample_income(
    brackets: &[hcme_store::IncomeBracket],
    rng: &mut XorShiftRng,
) -> Result<f64> {
    if brackets.iter().map(|b| b.pct).sum::<f64>() <= 0.0 {
        return Ok(COUNTY_MEDIAN_INCOME);
    }
    let bracket = choose_weighted(brackets, |b| b.pct, rng, "income brackets", 0)?;
    let lower = bracket.lower_bound as f64;
    let upper = bracket.upper_bound as f64;
    if upper <= lower {
        return Ok(lower);
    }
    Ok(rng.gen_range(lower..upper))
}

/// A thin layer over quick-xml for the handful of shapes these files need.
struct XmlFile<W: Write> {
    writer: Writer<W>,
}

impl<W: Write> XmlFile<W> {
    fn new(inner: W, doctype: Option<&str>) -> Result<XmlFile<W>> {
        let mut writer = Writer::new_with_indent(inner, b' ', 2);
        writer.write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))?;
        if let Some(doctype) = doctype {
            writer.write_event(Event::DocType(BytesText::from_escaped(doctype)))?;
        }
        Ok(XmlFile { writer })
    }

    fn open(&mut self, name: &str, attributes: &[(&str, &str)]) -> Result<()> {
        let elem = BytesStart::new(name).with_attributes(attributes.iter().copied());
        self.writer.write_event(Event::Start(elem))?;
        Ok(())
    }

    fn close(&mut self, name: &str) -> Result<()> {
        self.writer.write_event(Event::End(BytesEnd::new(name)))?;
        Ok(())
    }

    fn empty(&mut self, name: &str, attributes: &[(&str, &str)]) -> Result<()> {
        let elem = BytesStart::new(name).with_attributes(attributes.iter().copied());
        self.writer.write_event(Event::Empty(elem))?;
        Ok(())
    }

    fn text(&mut self, name: &str, attributes: &[(&str, &str)], text: &str) -> Result<()> {
        self.open(name, attributes)?;
        self.writer.write_event(Event::Text(BytesText::new(text)))?;
        self.close(name)
    }

    fn finish(self) -> Result<W> {
        let mut inner = self.writer.into_inner();
        inner.write_all(b"\n")?;
        Ok(inner)
    }
}

pub fn write_population<W: Write>(out: W, plans: &[PersonPlan]) -> Result<W> {
    let mut xml = XmlFile::new(
        out,
        Some("population SYSTEM \"http://www.matsim.org/files/dtd/population_v6.dtd\""),
    )?;
    xml.open("population", &[])?;
    for plan in plans {
        xml.open("person", &[("id", plan.person_id.to_string().as_str())])?;
        xml.open("plan", &[("selected", "yes")])?;
        for (idx, activity) in plan.activities.iter().enumerate() {
            if idx > 0 {
                xml.empty("leg", &[])?;
            }
            let x = activity.pt.x.to_string();
            let y = activity.pt.y.to_string();
            let kind = if activity.home { "Home" } else { "Other" };
            let mut attributes = vec![("type", kind), ("x", x.as_str()), ("y", y.as_str())];
            let end_time = activity.end_time.map(hms);
            if let Some(ref end_time) = end_time {
                attributes.push(("end_time", end_time.as_str()));
            }
            xml.empty("activity", &attributes)?;
        }
        xml.close("plan")?;
        xml.close("person")?;
    }
    xml.close("population")?;
    xml.finish()
}

pub fn write_households<W: Write>(out: W, households: &[HouseholdInput]) -> Result<W> {
    let mut xml = XmlFile::new(out, None)?;
    xml.open(
        "households",
        &[
            ("xmlns", "http://www.matsim.org/files/dtd"),
            ("xmlns:xsi", "http://www.w3.org/2001/XMLSchema-instance"),
            (
                "xsi:schemaLocation",
                "http://www.matsim.org/files/dtd http://www.matsim.org/files/dtd/households_v1.0.xsd",
            ),
        ],
    )?;
    for household in households {
        xml.open("household", &[("id", household.id.to_string().as_str())])?;
        xml.open("members", &[])?;
        for person in &household.members {
            xml.empty("personId", &[("refId", person.to_string().as_str())])?;
        }
        xml.close("members")?;
        xml.open("vehicles", &[])?;
        for vehicle in &household.vehicles {
            xml.empty("vehicleDefinitionId", &[("refId", vehicle.as_str())])?;
        }
        xml.close("vehicles")?;
        xml.text(
            "income",
            &[("currency", "usd"), ("period", "year")],
            &format!("{:.0}", household.income),
        )?;
        xml.close("household")?;
    }
    xml.close("households")?;
    xml.finish()
}

pub fn write_vehicles<W: Write>(out: W, households: &[HouseholdInput]) -> Result<W> {
    let mut writer = csv::Writer::from_writer(out);
    writer.write_record(["vehicleId", "vehicleTypeId", "householdId"])?;
    for household in households {
        let id = household.id.to_string();
        for vehicle in &household.vehicles {
            writer.write_record([vehicle.as_str(), VEHICLE_TYPE, id.as_str()])?;
        }
    }
    writer
        .into_inner()
        .map_err(|err| anyhow::anyhow!("flushing vehicles: {}", err))
}

/// `(id, [(name, java class, value)])` per object.
type ObjectAttributes = Vec<(String, Vec<(&'static str, &'static str, String)>)>;

fn write_object_attributes<W: Write>(out: W, objects: &ObjectAttributes) -> Result<W> {
    let mut xml = XmlFile::new(
        out,
        Some("objectAttributes SYSTEM \"http://matsim.org/files/dtd/objectattributes_v1.dtd\""),
    )?;
    xml.open("objectAttributes", &[])?;
    for (id, attributes) in objects {
        xml.open("object", &[("id", id.as_str())])?;
        for (name, class, value) in attributes {
            xml.text("attribute", &[("name", *name), ("class", *class)], value)?;
        }
        xml.close("object")?;
    }
    xml.close("objectAttributes")?;
    xml.finish()
}

pub fn write_household_attributes<W: Write>(out: W, households: &[HouseholdInput]) -> Result<W> {
    let objects: ObjectAttributes = households
        .iter()
        .map(|h| {
            (
                h.id.to_string(),
                vec![
                    ("homecoordx", "java.lang.Double", h.home.x.to_string()),
                    ("homecoordy", "java.lang.Double", h.home.y.to_string()),
                ],
            )
        })
        .collect();
    write_object_attributes(out, &objects)
}

/// Each member's rank is their position in the household, ordered by person id.
pub fn write_population_attributes<W: Write>(
    out: W,
    households: &[HouseholdInput],
) -> Result<W> {
    let mut objects: ObjectAttributes = Vec::new();
    for household in households {
        let mut members = household.members.clone();
        members.sort_unstable();
        for (rank, person) in members.into_iter().enumerate() {
            objects.push((
                person.to_string(),
                vec![
                    ("rank", "java.lang.Integer", rank.to_string()),
                    ("excluded-modes", "java.lang.String", String::new()),
                ],
            ));
        }
    }
    write_object_attributes(out, &objects)
}

#[derive(Debug, PartialEq)]
pub struct InputSummary {
    pub persons: usize,
    pub households: usize,
    pub vehicles: usize,
}

fn create<P: AsRef<std::path::Path>>(path: P) -> Result<BufWriter<fs_err::File>> {
    let path = hcme_io::prepare_output(path)?;
    info!("Writing {}", path.display());
    Ok(BufWriter::new(fs_err::File::create(path)?))
}

/// Writes every simulator input file to the artifact paths.
pub fn build_inputs(
    store: &Store,
    artifacts: &Artifacts,
    pct_vehicle_ownership: f64,
    timer: &mut Timer,
) -> Result<InputSummary> {
    if !(0.0..=1.0).contains(&pct_vehicle_ownership) {
        anyhow::bail!(
            "Vehicle ownership must be between 0 and 1, not {}",
            pct_vehicle_ownership
        );
    }

    let utm = Utm::zone10()?;
    timer.start("build plans");
    let plans = person_plans(&utm, &store.plan_legs()?)?;
    timer.stop("build plans");

    let members = store.households_with_members()?;
    let mut households = Vec::new();
    timer.start_iter("build households", members.len());
    for household in &members {
        timer.next();
        households.push(household_input(store, &utm, household, pct_vehicle_ownership)?);
    }

    write_population(create(&artifacts.population)?, &plans)?.flush()?;
    write_households(create(&artifacts.households)?, &households)?.flush()?;
    write_vehicles(create(&artifacts.vehicles)?, &households)?.flush()?;
    write_household_attributes(create(&artifacts.household_attributes)?, &households)?.flush()?;
    write_population_attributes(create(&artifacts.population_attributes)?, &households)?
        .flush()?;

    let summary = InputSummary {
        persons: plans.len(),
        households: households.len(),
        vehicles: households.iter().map(|h| h.vehicles.len()).sum(),
    };
    timer.note(format!(
        "Wrote plans for {} people in {} households with {} vehicles",
        prettyprint_usize(summary.persons),
        prettyprint_usize(summary.households),
        prettyprint_usize(summary.vehicles)
    ));
    Ok(summary)
}
