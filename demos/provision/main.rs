use anyhow::Result;
use clap::Parser;
use graphplan::{state_from_world, Action, Planner, State, World};
use serde_json::json;

/// Plans the provisioning steps that bring a host into service.
#[derive(Debug, Parser)]
#[command(name = "provision")]
struct Opt {
    /// Replan from a fully provisioned host after these propositions
    /// stopped holding, instead of provisioning from scratch.
    #[arg(long = "update", value_name = "PROP")]
    update: Vec<String>,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let opt = Opt::parse();

    let mut world = World::new();
    let actions = provisioning_actions(&mut world);

    let facts = serde_json::Map::from_iter([
        ("ip_address".to_string(), json!("169.254.169.1")),
        ("ip_address_ipmi".to_string(), json!("")),
        ("downtime".to_string(), json!(false)),
    ]);
    let starting_state = state_from_world(&mut world, &facts);
    let goal: State = [world.prop("status__in-service")].into_iter().collect();
    let update: State = opt.update.iter().map(|label| world.prop(label)).collect();

    // a host with every provisioning step already done
    let provisioned: State = [
        world.prop("ip_address"),
        world.prop("ip_address_ipmi"),
        world.prop("dns_record"),
        world.prop("dns_record_ipmi"),
        world.prop("downtime__unset"),
        world.prop("image"),
        world.prop("status__in-service"),
    ]
    .into_iter()
    .collect();

    let planner = Planner::new(&world);
    let (start, plan) = if update.is_empty() {
        let plan = planner.plan(&starting_state, &goal, &actions)?;
        (starting_state, plan)
    } else {
        let plan = planner.plan_state_update(&provisioned, &update, &actions)?;
        (provisioned, plan)
    };

    println!("Starting state:");
    for &prop in &start {
        println!("  {}", world.display(prop));
    }
    println!("=====");

    println!("Desired state:");
    for &prop in &goal {
        println!("  {}", world.display(prop));
    }
    println!("=====");

    println!("Available actions:");
    for action in &actions {
        println!("  {}", action.name);
        println!("    requirements: {}", list(&world, &action.requirements));
        println!("    effects: {}", list(&world, &action.effects));
    }
    println!("=====");

    println!("Plan: {} actions", plan.len());
    for action in &plan {
        println!("  {}", action.name);
    }
    Ok(())
}

fn provisioning_actions(world: &mut World) -> Vec<Action> {
    let ip = world.prop("ip_address");
    let ip_ipmi = world.prop("ip_address_ipmi");
    let dns = world.prop("dns_record");
    let dns_ipmi = world.prop("dns_record_ipmi");
    let downtime = world.prop("downtime");
    let image = world.prop("image");
    let in_service = world.prop("status__in-service");

    vec![
        Action::new("reserve_ip_address", [], [ip]),
        Action::new("reserve_ip_address_ipmi", [], [ip_ipmi]),
        Action::new("create_dns_record", [ip], [dns]),
        Action::new("create_dns_record_ipmi", [ip_ipmi], [dns_ipmi]),
        Action::new("set_downtime", [], [downtime]),
        Action::new("remove_downtime", [downtime], [!downtime]),
        Action::new("reimage", [ip, dns, dns_ipmi, downtime], [image]),
        Action::new("set_in_service", [image, !downtime], [in_service]),
    ]
}

fn list(world: &World, props: &State) -> String {
    props
        .iter()
        .map(|&p| world.display(p).to_string())
        .collect::<Vec<_>>()
        .join(", ")
}
