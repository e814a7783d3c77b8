#![allow(missing_docs)]
#![allow(clippy::float_cmp)]

use std::cell::RefCell;

use ndarray::Array1;
use neuroevo::training::agent::{Action, Agent, INITIAL_FITNESS};
use neuroevo::training::brain::{
    ACTION_SIGNAL_SIZE, Brain, CrossoverOperator, MutationOperator, Policy, Topology,
};
use neuroevo::training::error::{Result as TrainingResult, TrainingError};
use neuroevo::training::fitness::ShaperKind;
use neuroevo::training::params::{BestFitnessPolicy, Params};
use neuroevo::training::perception::{BodyState, Environment, TickContext};
use neuroevo::training::population::{Population, Telemetry, select_parent};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

const GOAL: [f32; 2] = [1000.0, 0.0];

fn create_test_params() -> Params {
    Params {
        population_size: 8,
        seed: Some(42),
        ..Params::default()
    }
}

#[derive(Debug, thiserror::Error)]
#[error("simulation exploded at agent {0}")]
struct Exploded(usize);

/// Bodies on a line; agents listed in `movers` step 1 unit towards the goal per action.
struct LineWorld {
    bodies: Vec<BodyState>,
    movers: Option<Vec<usize>>,
    acted: Vec<usize>,
    fail_at: Option<usize>,
}

impl LineWorld {
    fn new(n: usize) -> Self {
        Self {
            bodies: vec![
                BodyState {
                    position: [0.0, 0.0],
                    velocity: [0.0, 0.0],
                    airborne: false,
                    alive: true,
                };
                n
            ],
            movers: None,
            acted: Vec::new(),
            fail_at: None,
        }
    }
}

impl Environment for LineWorld {
    type Error = Exploded;

    fn body(&self, index: usize) -> Result<BodyState, Self::Error> {
        if self.fail_at == Some(index) {
            return Err(Exploded(index));
        }
        Ok(self.bodies[index])
    }

    fn apply_action(&mut self, index: usize, _action: Action) -> Result<(), Self::Error> {
        self.acted.push(index);
        let moves = self.movers.as_ref().is_none_or(|m| m.contains(&index));
        if moves {
            self.bodies[index].position[0] += 1.0;
        }
        Ok(())
    }
}

thread_local! {
    static OBSERVED: RefCell<Vec<Vec<f32>>> = const { RefCell::new(Vec::new()) };
}

/// Policy that records every observation it sees and never acts.
#[derive(Debug, Clone)]
struct Recorder;

impl Policy for Recorder {
    fn random<R: Rng>(_topology: Topology, _scale: f32, _rng: &mut R) -> Self {
        Recorder
    }

    fn topology(&self) -> Topology {
        Topology::CONTROL
    }

    fn activate(&self, observation: &Array1<f32>) -> Array1<f32> {
        OBSERVED.with(|seen| seen.borrow_mut().push(observation.to_vec()));
        Array1::zeros(ACTION_SIGNAL_SIZE)
    }

    fn mutate<R: Rng>(&mut self, _operator: MutationOperator, _rng: &mut R) {}

    fn crossover<R: Rng>(
        &self,
        _other: &Self,
        _operator: CrossoverOperator,
        _rng: &mut R,
    ) -> TrainingResult<Self> {
        Ok(Recorder)
    }

    fn to_bytes(&self) -> TrainingResult<Vec<u8>> {
        Ok(Vec::new())
    }

    fn from_bytes(_bytes: &[u8]) -> TrainingResult<Self> {
        Ok(Recorder)
    }
}

fn genomes(population: &Population) -> Vec<Vec<f32>> {
    population
        .agents()
        .iter()
        .map(|a| a.policy().to_flat_vector())
        .collect()
}

fn spawned(params: Params) -> Population {
    let size = params.population_size;
    let mut population = Population::new(params).unwrap();
    population.spawn(size).unwrap();
    population
}

fn run_ticks(population: &mut Population, world: &mut LineWorld, ticks: usize) {
    let ctx = TickContext {
        goal: GOAL,
        obstacles: &[],
    };
    for _ in 0..ticks {
        population.simulate(&ctx, world).unwrap();
    }
}

#[test]
fn test_spawn_creates_fresh_agents() {
    let population = spawned(create_test_params());
    assert_eq!(population.agents().len(), 8);
    assert_eq!(population.population_size(), 8);
    assert_eq!(population.generation(), 0);
    assert_eq!(population.alive_count(), 8);
    assert!(population.best_agent().is_none());
    for agent in population.agents() {
        assert_eq!(agent.fitness, INITIAL_FITNESS);
        assert_eq!(agent.policy().topology(), Topology::CONTROL);
    }
}

#[test]
fn test_spawn_zero_is_rejected() {
    let mut population: Population = Population::new(create_test_params()).unwrap();
    assert!(matches!(
        population.spawn(0),
        Err(TrainingError::InvalidParams(_))
    ));
}

#[test]
fn test_evolve_empty_population_is_noop() {
    let mut population: Population = Population::new(create_test_params()).unwrap();
    population.evolve().unwrap();
    assert_eq!(population.generation(), 0);
    assert!(population.agents().is_empty());
}

#[test]
fn test_select_parent_on_empty_population_fails() {
    let mut population: Population = Population::new(create_test_params()).unwrap();
    assert!(matches!(
        population.select_parent(),
        Err(TrainingError::EmptyPopulation)
    ));
}

#[test]
fn test_population_size_is_constant_across_generations() {
    let mut population = spawned(create_test_params());
    for generation in 1..=5 {
        let mut world = LineWorld::new(8);
        run_ticks(&mut population, &mut world, 3);
        population.evolve().unwrap();
        assert_eq!(population.agents().len(), 8);
        assert_eq!(population.generation(), generation);
    }
}

#[test]
fn test_dead_agents_are_refilled_to_full_size() {
    let mut population = spawned(create_test_params());
    for index in 0..6 {
        assert!(population.kill(index));
    }
    assert!(!population.kill(100));
    assert_eq!(population.alive_count(), 2);

    population.evolve().unwrap();

    assert_eq!(population.agents().len(), 8);
    assert_eq!(population.alive_count(), 8);
    assert_eq!(population.generation(), 1);
}

#[test]
fn test_all_dead_aborts_generation() {
    let mut population = spawned(create_test_params());
    for index in 0..8 {
        population.kill(index);
    }

    let err = population.evolve().unwrap_err();

    assert!(matches!(err, TrainingError::EmptyPopulation));
    assert_eq!(population.generation(), 0);
    assert_eq!(population.agents().len(), 8);
    assert_eq!(population.alive_count(), 0);
}

#[test]
fn test_simulate_rewards_progress_and_skips_dead() {
    let mut population = spawned(create_test_params());
    population.kill(3);
    let mut world = LineWorld::new(8);

    run_ticks(&mut population, &mut world, 5);

    assert!(!world.acted.contains(&3));
    assert_eq!(world.acted.len(), 7 * 5);
    for (index, agent) in population.agents().iter().enumerate() {
        if index == 3 {
            assert_eq!(agent.fitness, INITIAL_FITNESS);
        } else {
            assert!((agent.fitness - (INITIAL_FITNESS + 5.0 * 0.2)).abs() < 1e-4);
            assert_eq!(agent.stagnation_ticks(), 0);
        }
    }
}

#[test]
fn test_simulate_kills_agents_whose_body_died() {
    let mut population = spawned(create_test_params());
    let mut world = LineWorld::new(8);
    world.bodies[5].alive = false;

    run_ticks(&mut population, &mut world, 1);

    assert!(!population.agents()[5].is_alive());
    assert_eq!(population.alive_count(), 7);

    world.bodies[5].alive = true;
    run_ticks(&mut population, &mut world, 1);
    assert!(!population.agents()[5].is_alive());
}

#[test]
fn test_simulate_propagates_environment_errors() {
    let mut population = spawned(create_test_params());
    let mut world = LineWorld::new(8);
    world.fail_at = Some(2);
    let ctx = TickContext {
        goal: GOAL,
        obstacles: &[],
    };

    let err = population.simulate(&ctx, &mut world).unwrap_err();

    assert!(matches!(err, TrainingError::Environment(_)));
    assert_eq!(world.acted, vec![0, 1]);
}

#[test]
fn test_best_fitness_is_overwritten_each_generation() {
    let mut population = spawned(create_test_params());
    let mut world = LineWorld::new(8);
    run_ticks(&mut population, &mut world, 5);
    population.evolve().unwrap();
    assert!((population.best_fitness_ever() - 11.0).abs() < 1e-4);

    // No ticks: every agent still has the initial fitness.
    population.evolve().unwrap();
    assert_eq!(population.best_fitness_ever(), INITIAL_FITNESS);
    let best = population.best_agent().unwrap();
    assert_eq!(best.fitness, INITIAL_FITNESS);
    assert!(best.is_alive());
}

#[test]
fn test_running_max_keeps_highest_fitness() {
    let mut population = spawned(Params {
        best_fitness: BestFitnessPolicy::RunningMax,
        ..create_test_params()
    });
    let mut world = LineWorld::new(8);
    run_ticks(&mut population, &mut world, 5);
    population.evolve().unwrap();
    population.evolve().unwrap();
    assert!((population.best_fitness_ever() - 11.0).abs() < 1e-4);
}

#[test]
fn test_best_agent_snapshot_is_fresh_copy_of_leader() {
    let mut population = spawned(create_test_params());
    let mut world = LineWorld::new(8);
    world.movers = Some(vec![4]);
    run_ticks(&mut population, &mut world, 5);
    let leader = population.agents()[4].policy().clone();

    population.evolve().unwrap();

    let best = population.best_agent().unwrap();
    assert_eq!(best.policy(), &leader);
    assert_eq!(best.fitness, INITIAL_FITNESS);
    assert_eq!(best.best_distance(), f32::INFINITY);
}

#[test]
fn test_elitism_carries_best_policy_unchanged() {
    let mut population = spawned(Params {
        elitism: 1,
        mutation_probability: 1.0,
        ..create_test_params()
    });
    let mut world = LineWorld::new(8);
    world.movers = Some(vec![6]);
    run_ticks(&mut population, &mut world, 5);
    let leader = population.agents()[6].policy().clone();

    population.evolve().unwrap();

    assert_eq!(population.agents()[0].policy(), &leader);
    assert_eq!(population.agents()[0].fitness, INITIAL_FITNESS);
}

#[test]
fn test_seeded_runs_are_reproducible() {
    let run = || {
        let mut population = spawned(create_test_params());
        for _ in 0..3 {
            let mut world = LineWorld::new(8);
            world.movers = Some(vec![1, 2]);
            run_ticks(&mut population, &mut world, 4);
            population.evolve().unwrap();
        }
        population
            .agents()
            .iter()
            .map(|a| a.policy().to_flat_vector())
            .collect::<Vec<_>>()
    };

    assert_eq!(run(), run());
}

#[test]
fn test_rank_selection_frequencies_follow_rank() {
    let mut rng = StdRng::seed_from_u64(7);
    // Deliberately shuffled; ranks are 1..=4 by fitness.
    let fitness = [3.0, 1.0, 4.0, 2.0];
    let agents: Vec<Agent> = fitness
        .iter()
        .map(|&f| {
            let brain = Brain::random(Topology::CONTROL, 1.0, &mut rng);
            let mut agent = Agent::new(brain, ShaperKind::Progress).unwrap();
            agent.fitness = f;
            agent
        })
        .collect();
    let refs: Vec<&Agent> = agents.iter().collect();

    let trials = 40_000;
    let mut counts = [0usize; 4];
    for _ in 0..trials {
        let parent = select_parent(&refs, &mut rng).unwrap();
        let index = agents
            .iter()
            .position(|a| std::ptr::eq(a, parent))
            .unwrap();
        counts[index] += 1;
    }

    for (index, &f) in fitness.iter().enumerate() {
        let expected = f / 10.0;
        let observed = counts[index] as f32 / trials as f32;
        assert!(
            (observed - expected).abs() < 0.015,
            "rank {} selected {:.3}, expected {:.3}",
            f,
            observed,
            expected
        );
    }
}

#[test]
fn test_telemetry_reports_state() {
    let mut population = spawned(create_test_params());
    population.kill(0);
    let telemetry = population.telemetry();
    assert_eq!(telemetry.generation, 0);
    assert_eq!(telemetry.alive_count, 7);
    assert_eq!(telemetry.population_size, 8);
    assert_eq!(telemetry.mean_fitness, INITIAL_FITNESS);
    assert_eq!(telemetry.best_fitness_ever, None);
}

#[test]
fn test_telemetry_json_roundtrip_before_and_after_evolve() {
    let mut population = spawned(create_test_params());

    let json = serde_json::to_string(&population.telemetry()).unwrap();
    let restored: Telemetry = serde_json::from_str(&json).unwrap();
    assert_eq!(restored, population.telemetry());
    assert_eq!(restored.best_fitness_ever, None);

    population.evolve().unwrap();
    let json = serde_json::to_string(&population.telemetry()).unwrap();
    let restored: Telemetry = serde_json::from_str(&json).unwrap();
    assert_eq!(restored.best_fitness_ever, Some(INITIAL_FITNESS));
    assert_eq!(restored.generation, 1);
}

#[test]
fn test_simulate_observes_nearby_obstacles_in_order() {
    OBSERVED.with(|seen| seen.borrow_mut().clear());
    let params = Params {
        population_size: 2,
        detection_radius: 100.0,
        ..create_test_params()
    };
    let mut population: Population<Recorder> = Population::new(params).unwrap();
    population.spawn(2).unwrap();

    let mut world = LineWorld::new(2);
    world.bodies[0].velocity = [1.5, -2.0];
    world.bodies[0].airborne = true;
    world.bodies[1].position = [700.0, 0.0];

    // Within 100 of the first body: 50, 14.1, 28.3 and 30 away.
    // [0, -150] would be seen with the default radius; [100, 0] sits on the edge.
    let obstacles = [
        [0.0, -150.0],
        [50.0, 0.0],
        [100.0, 0.0],
        [10.0, 10.0],
        [20.0, 20.0],
        [-30.0, 0.0],
        [750.0, 0.0],
    ];
    let ctx = TickContext {
        goal: GOAL,
        obstacles: &obstacles,
    };
    population.simulate(&ctx, &mut world).unwrap();

    let observed = OBSERVED.with(|seen| seen.borrow().clone());
    assert_eq!(observed.len(), 2);
    assert_eq!(
        observed[0],
        vec![0.0, 0.0, 1.5, -2.0, 1000.0, 1.0, 50.0, 0.0, 10.0, 10.0, 20.0, 20.0]
    );
    assert_eq!(
        observed[1],
        vec![700.0, 0.0, 0.0, 0.0, 300.0, 0.0, 750.0, 0.0, 0.0, 0.0, 0.0, 0.0]
    );
}

#[test]
fn test_without_mutation_children_are_pure_crossovers() {
    let mut population = spawned(Params {
        mutation_probability: 0.0,
        ..create_test_params()
    });
    let parents = genomes(&population);

    population.evolve().unwrap();

    for child in genomes(&population) {
        for (i, gene) in child.iter().enumerate() {
            assert!(parents.iter().any(|p| p[i] == *gene));
        }
    }
}

#[test]
fn test_full_mutation_changes_every_child_except_elites() {
    let mut population = spawned(Params {
        mutation_probability: 1.0,
        mutation: MutationOperator::Noise { scale: 0.5 },
        elitism: 2,
        ..create_test_params()
    });
    let parents = genomes(&population);

    population.evolve().unwrap();
    let children = genomes(&population);

    for elite in &children[..2] {
        assert!(parents.contains(elite));
    }
    for child in &children[2..] {
        let inherited = child
            .iter()
            .enumerate()
            .filter(|(i, gene)| parents.iter().any(|p| p[*i] == **gene))
            .count();
        assert_eq!(inherited, 0);
    }
}
