//! The demo world graph: noise climate feeding a Whittaker classifier, with
//! a small terrain recipe per climate class.

use std::sync::Arc;

use strata_biomes::{BiomeSet, ClimateClass, DiagramCache, Function, FnExit, Layer, Whittaker};
use strata_config::Config;
use strata_graph::nodes::{Constant, Output};
use strata_graph::{Graph, GraphError, Link, PortKind, UnitId};

use crate::climate::ClimateNoise;

/// Parameter read by the desert dune function.
pub const DUNE_HEIGHT: &str = "dune_height";

/// A built world graph and the ids the driver needs to edit it.
pub struct World {
    pub graph: Graph,
    pub whittaker: UnitId,
    pub moisture: UnitId,
}

impl World {
    pub fn whittaker(&self) -> Option<&Whittaker> {
        self.graph.get_typed(self.whittaker)
    }
}

/// Base elevation contributed by each climate class.
fn base_height(class: ClimateClass) -> f32 {
    match class {
        ClimateClass::TropicalRainforest => 0.20,
        ClimateClass::TemperateRainforest => 0.30,
        ClimateClass::TropicalForest => 0.25,
        ClimateClass::TemperateForest => 0.35,
        ClimateClass::Taiga => 0.45,
        ClimateClass::Savanna => 0.15,
        ClimateClass::Grassland => 0.20,
        ClimateClass::Tundra => 0.55,
        ClimateClass::Desert => 0.10,
        ClimateClass::ColdDesert => 0.40,
    }
}

/// `Constant -> Output` recipe.
fn flat_graph(class: ClimateClass, height: f32) -> Result<Graph, GraphError> {
    let mut graph = Graph::new(class.label());
    let constant = graph.add(Constant::new(height));
    let output = Output::new(format!("{} height", class.label()));
    let inlet = output.input.id;
    graph.add(output);
    graph.connect(Link::to(constant), inlet)?;
    Ok(graph)
}

/// Taiga splits into forest floor and rock outcrops driven by a local
/// noise field.
fn taiga_graph(config: &Config) -> Result<Graph, GraphError> {
    let floor = flat_graph(ClimateClass::Taiga, base_height(ClimateClass::Taiga))?;
    let mut rocks_graph = Graph::new("Rock outcrops");
    let rock = rocks_graph.add(Constant::new(0.7));
    let rock_output = Output::new("Rock height").without_draft();
    let rock_inlet = rock_output.input.id;
    rocks_graph.add(rock_output);
    rocks_graph.connect(Link::to(rock), rock_inlet)?;

    // Outcrops claim their share first, the floor takes the remainder.
    let mut set = BiomeSet::new().with_layers([
        Layer::new("Rock outcrops")
            .with_graph(rocks_graph)
            .with_opacity(0.8),
        Layer::new("Forest floor").with_graph(floor),
    ]);
    if !config.biomes.base_layer {
        set = set.without_base_layer();
    }
    set.presence_threshold = config.biomes.presence_threshold;
    let rocks_inlet = set.layers()[0].inlet.id;

    let mut graph = Graph::new("Taiga");
    let mut outcrops = ClimateNoise::new("Outcrop noise", config.generation.seed.wrapping_add(17));
    outcrops.frequency = 0.02;
    outcrops.bias = -0.25;
    let outcrops = graph.add(outcrops);
    graph.add(set);
    graph.connect(Link::to(outcrops), rocks_inlet)?;
    Ok(graph)
}

/// Deserts wrap their dune recipe in a reusable function and override its
/// height parameter.
fn desert_graph() -> Result<Graph, GraphError> {
    let mut dunes = Graph::new("Dunes");
    let height = dunes.add(Constant::with_param(DUNE_HEIGHT, 0.1));
    let exit = FnExit::new("height", PortKind::Raster);
    let exit_inlet = exit.input.id;
    dunes.add(exit);
    dunes.connect(Link::to(height), exit_inlet)?;
    dunes.defaults_mut().set(DUNE_HEIGHT, 0.1);

    let mut function = Function::new("Dunes", dunes);
    function.overrides.set(DUNE_HEIGHT, 0.25);
    let outlet = function
        .outlet("height")
        .ok_or_else(|| GraphError::PortalMissing("height".to_string()))?;

    let mut graph = Graph::new(ClimateClass::Desert.label());
    let function = graph.add(function);
    let output = Output::new("Desert height");
    let inlet = output.input.id;
    graph.add(output);
    graph.connect(Link::outlet(function, outlet), inlet)?;
    Ok(graph)
}

/// Builds the demo world around a shared diagram cache.
pub fn build(config: &Config, diagrams: Arc<DiagramCache>) -> Result<World, GraphError> {
    let mut graph = Graph::new("World");

    let seed = config.generation.seed;
    let temperature = graph.add(ClimateNoise::new("Temperature", seed));
    let mut moisture = ClimateNoise::new("Moisture", seed.wrapping_mul(31).wrapping_add(7));
    moisture.frequency = 0.006;
    let moisture = graph.add(moisture);

    let mut whittaker = Whittaker::new(diagrams);
    whittaker.sharpness = config.biomes.sharpness;
    whittaker.presence_threshold = config.biomes.presence_threshold;
    for class in ClimateClass::ALL {
        let sub = match class {
            ClimateClass::Taiga => taiga_graph(config)?,
            ClimateClass::Desert => desert_graph()?,
            _ => flat_graph(class, base_height(class))?,
        };
        whittaker.set_graph(class, Some(sub));
    }
    let temperature_inlet = whittaker.temperature.id;
    let moisture_inlet = whittaker.moisture.id;
    let whittaker = graph.add(whittaker);

    graph.connect(Link::to(temperature), temperature_inlet)?;
    graph.connect(Link::to(moisture), moisture_inlet)?;

    Ok(World {
        graph,
        whittaker,
        moisture,
    })
}
