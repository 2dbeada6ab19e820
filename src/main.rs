use anyhow::Result;
use cinegraph::config::EngineConfig;
use cinegraph::exec::memory::MemoryGraph;
use cinegraph::intent::client::HttpModel;
use cinegraph::intent::{
    DepthRange, Filter, FilterAnchor, FilterOp, PathConstraint, PathStep, QueryIntent,
    RankingCriterion, Signal, TraverseDirection,
};
use cinegraph::pipeline::Engine;
use cinegraph::schema::GraphSchema;
use std::sync::Arc;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt::init();

    println!("Cinegraph Recommendation Engine v{}", cinegraph::version());
    println!("==========================================");
    println!();

    let schema = Arc::new(GraphSchema::movielens());
    let store = Arc::new(sample_graph());
    println!(
        "Sample graph: {} nodes, {} edges",
        store.node_count(),
        store.edge_count()
    );

    let config = EngineConfig::default();
    let model = Arc::new(HttpModel::new(&config.model)?);
    let engine = Engine::new(schema, config, model, store);

    // A structured intent entering the deterministic pipeline directly:
    // "movies similar to Inception", evidence = co-rating overlap
    let intent = QueryIntent {
        target: "Movie".into(),
        filters: vec![Filter {
            attribute: "title".into(),
            op: FilterOp::Eq,
            value: "Inception".into(),
            anchor: FilterAnchor::PathStart(0),
        }],
        paths: vec![PathConstraint {
            steps: vec![
                PathStep {
                    edge: "RATED".into(),
                    direction: TraverseDirection::Reverse,
                },
                PathStep {
                    edge: "RATED".into(),
                    direction: TraverseDirection::Forward,
                },
            ],
            depth: DepthRange::exact(2),
        }],
        ranking: vec![
            RankingCriterion::new(Signal::SharedNeighbors, 1.0),
            RankingCriterion::new(Signal::AverageRating, 0.5),
        ],
        limit: 5,
    };

    let payload = engine.run_intent(intent).await?;

    println!();
    println!("{}", payload.summary);
    println!(
        "Subgraph for visualization: {} nodes, {} links",
        payload.subgraph.nodes.len(),
        payload.subgraph.links.len()
    );
    for item in &payload.items {
        println!(
            "  {} score {:.3} ({} evidence paths)",
            item.node.display_label(),
            item.score,
            item.trace.paths.len()
        );
    }

    Ok(())
}

/// A handful of movies, users and ratings shaped like the MovieLens graph
fn sample_graph() -> MemoryGraph {
    let mut g = MemoryGraph::new();

    let titles = [
        ("Inception", 2010),
        ("The Matrix", 1999),
        ("Memento", 2000),
        ("Interstellar", 2014),
        ("Heat", 1995),
    ];
    let movies: Vec<u64> = titles
        .iter()
        .map(|(title, year)| {
            let id = g.create_node("Movie");
            g.set_node_attr(id, "title", *title).unwrap();
            g.set_node_attr(id, "year", *year as i64).unwrap();
            id
        })
        .collect();

    // (user, [(movie index, rating)])
    let ratings: [(&str, &[(usize, f64)]); 4] = [
        ("alice", &[(0, 5.0), (1, 4.5), (3, 4.0)]),
        ("bob", &[(0, 4.5), (1, 4.0), (2, 3.5)]),
        ("carol", &[(0, 4.0), (3, 4.5)]),
        ("dave", &[(1, 3.0), (4, 4.0)]),
    ];
    for (name, rated) in ratings {
        let user = g.create_node("User");
        g.set_node_attr(user, "name", name).unwrap();
        for (index, rating) in rated {
            let edge = g.create_edge(user, movies[*index], "RATED").unwrap();
            g.set_edge_attr(edge, "rating", *rating).unwrap();
        }
    }

    g
}
