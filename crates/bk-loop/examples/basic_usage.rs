use anyhow::Result;
use bk_loop::*;
use bk_types::{Observation, ParameterSpace, Point};

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    println!("🌟 BayesKit Basic Usage Example");

    // The black box to minimize: a shifted quadratic with optimum at 0.3.
    let objective = |p: &Point| {
        let x = p.values[0].as_float().unwrap_or(f64::NAN);
        (x - 0.3) * (x - 0.3)
    };

    // One continuous parameter on [0, 1].
    let space = ParameterSpace::new().add_continuous("x", 0.0, 1.0);
    println!("Search space: {} parameter(s)", space.len());

    // A small seed design evaluated up front.
    let seed_x = vec![
        Point::from_floats(&[0.1]),
        Point::from_floats(&[0.6]),
        Point::from_floats(&[0.9]),
    ];
    let seed_y: Vec<Vec<f64>> = seed_x.iter().map(|p| vec![objective(p)]).collect();
    println!("Seeded {} observations", seed_x.len());

    // Internal mode: the engine calls the objective itself.
    let mut engine = LoopEngine::builder(space.clone()).seed(7).build(&seed_x, &seed_y)?;
    let mut evaluator = objective;
    let report = engine.run(&mut evaluator, &FixedIterationsStoppingCondition::new(10))?;

    println!(
        "Internal run finished: {} iterations, {} observations",
        report.iterations, report.observation_count
    );
    if let Some(best) = &report.best {
        println!("Best found: {}", best);
    }

    // External mode: the caller evaluates candidates out of band.
    let mut engine = LoopEngine::builder(space).seed(7).batch_size(2).build(&seed_x, &seed_y)?;
    let mut results: Vec<Observation> = Vec::new();
    for round in 1..=5 {
        let points = engine.get_next_points(&results)?;
        println!("Round {round}: evaluating {} candidate(s)", points.len());
        results = points
            .iter()
            .map(|p| Observation::new(p.clone(), objective(p)))
            .collect();
    }
    let report = engine.stop("demo rounds exhausted")?;
    println!(
        "External run stopped: {} iterations, best {:?}",
        report.iterations,
        report.best.map(|b| b.objective())
    );

    println!("✅ Done");
    Ok(())
}
