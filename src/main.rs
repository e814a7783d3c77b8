//! Headless trainer: evolves agents in a small kinematic platform world.

use std::path::PathBuf;

use neuroevo::training::agent::Action;
use neuroevo::training::error::TrainingError;
use neuroevo::training::params::Params;
use neuroevo::training::perception::{BodyState, Environment, TickContext};
use neuroevo::training::population::Population;

const WORLD_WIDTH: f32 = 1200.0;
const GROUND_Y: f32 = 560.0;
const START: [f32; 2] = [50.0, 300.0];
const GOAL: [f32; 2] = [1050.0, 450.0];
const OBSTACLES: [[f32; 2]; 4] = [[300.0, 500.0], [550.0, 420.0], [800.0, 480.0], [950.0, 380.0]];

const GRAVITY: f32 = 0.5;
const RUN_SPEED: f32 = 5.0;
const JUMP_SPEED: f32 = 10.0;
const TICKS_PER_GENERATION: usize = 300;

#[derive(Debug, thiserror::Error)]
enum WorldError {
    #[error("No body for agent {0}")]
    MissingBody(usize),
}

/// Point-mass bodies falling onto a flat floor, bounded by deadly walls.
struct World {
    bodies: Vec<BodyState>,
}

impl World {
    fn new(n: usize) -> Self {
        Self {
            bodies: vec![
                BodyState {
                    position: START,
                    velocity: [0.0, 0.0],
                    airborne: true,
                    alive: true,
                };
                n
            ],
        }
    }

    fn step(&mut self) {
        for body in self.bodies.iter_mut().filter(|b| b.alive) {
            body.velocity[1] += GRAVITY;
            body.position[0] += body.velocity[0];
            body.position[1] += body.velocity[1];

            if body.position[1] >= GROUND_Y {
                body.position[1] = GROUND_Y;
                body.velocity[1] = 0.0;
                body.airborne = false;
            } else {
                body.airborne = true;
            }

            if body.position[0] <= 0.0 || body.position[0] >= WORLD_WIDTH {
                body.alive = false;
            }
        }
    }
}

impl Environment for World {
    type Error = WorldError;

    fn body(&self, index: usize) -> Result<BodyState, Self::Error> {
        self.bodies
            .get(index)
            .copied()
            .ok_or(WorldError::MissingBody(index))
    }

    fn apply_action(&mut self, index: usize, action: Action) -> Result<(), Self::Error> {
        let body = self
            .bodies
            .get_mut(index)
            .ok_or(WorldError::MissingBody(index))?;

        body.velocity[0] = match (action.left, action.right) {
            (true, false) => -RUN_SPEED,
            (false, true) => RUN_SPEED,
            _ => 0.0,
        };
        if action.up && !body.airborne {
            body.velocity[1] = -JUMP_SPEED;
        }
        Ok(())
    }
}

fn main() {
    env_logger::init();

    let args: Vec<String> = std::env::args().collect();

    if args.get(1).is_some_and(|a| a == "--example") {
        match serde_json::to_string_pretty(&Params::default()) {
            Ok(json) => println!("{}", json),
            Err(e) => eprintln!("Error encoding parameters: {}", e),
        }
        return;
    }

    let params = match args.get(1) {
        Some(path) => Params::load_from_file(path).unwrap_or_else(|e| {
            eprintln!("Error loading parameters: {}", e);
            eprintln!("Usage: {} [params.json] [generations] [checkpoint.json]", args[0]);
            std::process::exit(1);
        }),
        None => Params::default(),
    };
    let generations: u32 = args.get(2).and_then(|s| s.parse().ok()).unwrap_or(20);
    let checkpoint_path = args.get(3).map(PathBuf::from);

    let size = params.population_size;
    let mut population: Population = Population::new(params).unwrap_or_else(|e| {
        eprintln!("Error creating population: {}", e);
        std::process::exit(1);
    });
    if let Err(e) = population.spawn(size) {
        eprintln!("Error spawning agents: {}", e);
        std::process::exit(1);
    }

    println!("Neuroevo training");
    println!("=================");
    println!("Agents: {}, generations: {}", size, generations);

    let ctx = TickContext {
        goal: GOAL,
        obstacles: &OBSTACLES,
    };

    for _ in 0..generations {
        let mut world = World::new(size);

        for _ in 0..TICKS_PER_GENERATION {
            if let Err(e) = population.simulate(&ctx, &mut world) {
                eprintln!("Simulation failed: {}", e);
                std::process::exit(1);
            }
            world.step();
        }

        let alive = population.alive_count();
        match population.evolve() {
            Ok(()) => {}
            Err(TrainingError::EmptyPopulation) => {
                log::warn!("Every agent died, respawning a random population");
                if let Err(e) = population.spawn(size) {
                    eprintln!("Error spawning agents: {}", e);
                    std::process::exit(1);
                }
            }
            Err(e) => {
                eprintln!("Evolution failed: {}", e);
                std::process::exit(1);
            }
        }

        let telemetry = population.telemetry();
        match telemetry.best_fitness_ever {
            Some(best) => println!(
                "Generation {:>4}: best fitness {:>8.2}, survivors {}/{}",
                telemetry.generation, best, alive, size
            ),
            None => println!(
                "Generation {:>4}: no best agent yet, survivors {}/{}",
                telemetry.generation, alive, size
            ),
        }
    }

    if let Some(path) = checkpoint_path {
        match population.save_checkpoint(&path) {
            Ok(()) => println!("Saved best policy to {}", path.display()),
            Err(e) => eprintln!("Error saving checkpoint: {}", e),
        }
    }
}
