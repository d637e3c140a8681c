// Given-When-Then tests of the engine driven by scripted draws.
// Every duration is chosen so the event times are exact in binary floating
// point.

use approx::assert_relative_eq;
use fork_join::{
    ConfigError, Engine, LogEntry, RunError, ScriptedVariates, SimConfig, StopCondition,
    run_single,
};

fn config(fan_out: usize, servers: usize, requests: u64) -> SimConfig {
    SimConfig::new(fan_out, StopCondition::Requests(requests)).with_servers(servers)
}

#[test]
fn given_one_request_target_when_first_job_joins_then_run_stops() {
    // GIVEN: a single job split across servers 0 and 2 of 3
    let source = ScriptedVariates::new()
        .arrivals([1.0])
        .preprocessing([0.5])
        .servers([vec![0, 2]])
        .subtasks([2.0, 3.0]);
    let mut engine = Engine::new(config(2, 3, 1), source).unwrap();

    // WHEN: running to the stop condition
    let report = engine.run_until_stop().unwrap();

    // THEN: it stops at the last sub-task's finish, 4 steps in
    assert_eq!(engine.steps(), 4);
    assert_eq!(report.completed_requests, 1);
    assert_eq!(report.arrivals, 1);
    assert_relative_eq!(report.elapsed, 4.5);
    assert_relative_eq!(report.mean_response_time.unwrap(), 3.5);
    assert!(engine.joins().is_empty(), "Join entry removed on completion");
}

#[test]
fn given_arrival_and_server_finish_at_same_instant_when_stepping_then_arrival_fires_first() {
    // GIVEN: job 0 finishes on server 0 at 3.5, exactly when job 1 arrives
    let source = ScriptedVariates::new()
        .arrivals([1.0, 2.5])
        .preprocessing([0.5, 0.5])
        .servers([vec![0]])
        .subtasks([2.0]);
    let mut engine = Engine::new(config(1, 1, 1), source).unwrap();
    engine.step().unwrap(); // arrival at 1.0
    engine.step().unwrap(); // split at 1.5

    // WHEN: advancing to 3.5
    let log = engine.step().unwrap();

    // THEN: one step fires both, arrival before the server
    assert_eq!(engine.now(), 3.5);
    let entries: Vec<_> = log.iter().map(|r| r.entry.clone()).collect();
    assert_eq!(
        entries,
        vec![
            LogEntry::Arrived {
                job: 1,
                requiring: 0.5
            },
            LogEntry::SubtaskFinished { server: 0, job: 0 },
            LogEntry::Completed {
                job: 0,
                response_time: 2.5
            },
        ]
    );
    assert!(log.iter().all(|r| r.time == 3.5));
}

#[test]
fn given_arrival_preprocessor_and_server_due_together_when_stepping_then_all_fire_in_order() {
    // GIVEN: at 3.0 job 2 arrives, job 1 leaves the preprocessor and
    // server 0 finishes job 0
    let source = ScriptedVariates::new()
        .arrivals([1.0, 1.0, 1.0])
        .preprocessing([1.0, 1.0, 5.0])
        .subtasks([1.0, 7.0]);
    let mut engine = Engine::new(config(1, 1, 1), source).unwrap();
    engine.step().unwrap(); // job 0 arrives at 1.0
    engine.step().unwrap(); // job 1 queues, job 0 split at 2.0

    // WHEN
    let log = engine.step().unwrap();

    // THEN: job 2 queues before job 1 leaves, so job 2 draws the next
    // preprocessing time, and the server goes last
    let rendered: Vec<_> = log.iter().map(|r| r.to_string()).collect();
    assert_eq!(
        rendered,
        vec![
            "3.000000 - Job 2 arrived, waiting behind 1 jobs",
            "3.000000 - Job 1 split to servers [0]",
            "3.000000 - Preprocessor started job 2, requiring 5.000000 time",
            "3.000000 - Server 0 finished subtask on job 0",
            "3.000000 - Server 0 started subtask on job 1, requiring 7.000000 time",
            "3.000000 - Job 0 completed after 2.000000 time",
        ]
    );
    assert_eq!(engine.steps(), 3);
    assert_eq!(engine.preprocessor().station().active_remaining(), Some(5.0));
}

#[test]
fn given_zero_preprocessing_draw_when_server_also_due_then_preprocessor_fires_before_server() {
    // GIVEN: job 1 arrives at 3.0 to an idle preprocessor and draws no
    // preprocessing time, while server 0 finishes job 0 at 3.0
    let source = ScriptedVariates::new()
        .arrivals([1.0, 2.0])
        .preprocessing([0.5, 0.0])
        .servers([vec![0], vec![1]])
        .subtasks([1.5, 1.0]);
    let mut engine = Engine::new(config(1, 2, 1), source).unwrap();
    engine.step().unwrap(); // arrival at 1.0
    engine.step().unwrap(); // split at 1.5

    // WHEN
    let log = engine.step().unwrap();

    // THEN: the zero draw fires in its own turn, ahead of the server
    let rendered: Vec<_> = log.iter().map(|r| r.to_string()).collect();
    assert_eq!(
        rendered,
        vec![
            "3.000000 - Job 1 arrived, requiring 0.000000 time",
            "3.000000 - Job 1 split to servers [1]",
            "3.000000 - Server 1 started subtask on job 1, requiring 1.000000 time",
            "3.000000 - Server 0 finished subtask on job 0",
            "3.000000 - Job 0 completed after 2.000000 time",
        ]
    );
    assert_eq!(engine.steps(), 3);
}

#[test]
fn given_zero_preprocessing_draw_onto_finishing_server_when_stepping_then_split_queues_first() {
    // GIVEN: as above, but job 1 is split onto server 0, which is finishing
    let source = ScriptedVariates::new()
        .arrivals([1.0, 2.0])
        .preprocessing([0.5, 0.0])
        .servers([vec![0], vec![0]])
        .subtasks([1.5, 4.0]);
    let mut engine = Engine::new(config(1, 2, 1), source).unwrap();
    engine.step().unwrap();
    engine.step().unwrap();

    // WHEN
    let log = engine.step().unwrap();

    // THEN: job 1 queues behind job 0 and starts when server 0 frees up
    let entries: Vec<_> = log.into_iter().map(|r| r.entry).collect();
    assert_eq!(
        entries,
        vec![
            LogEntry::Arrived {
                job: 1,
                requiring: 0.0
            },
            LogEntry::Split {
                job: 1,
                servers: vec![0]
            },
            LogEntry::SubtaskFinished { server: 0, job: 0 },
            LogEntry::SubtaskStarted {
                server: 0,
                job: 1,
                requiring: 4.0
            },
            LogEntry::Completed {
                job: 0,
                response_time: 2.0
            },
        ]
    );
    assert_eq!(engine.servers().server(0).unwrap().active_job(), Some(1));
}

#[test]
fn given_busy_preprocessor_when_jobs_arrive_then_they_queue_behind_it() {
    // GIVEN: a long first preprocessing time
    let source = ScriptedVariates::new()
        .arrivals([1.0, 0.25, 0.25])
        .preprocessing([8.0, 1.0, 1.0]);
    let mut engine = Engine::new(config(1, 2, 1), source).unwrap();

    // WHEN: three jobs arrive before it finishes
    let logs: Vec<_> = (0..3).flat_map(|_| engine.step().unwrap()).collect();

    // THEN: the later two wait, seeing the queue ahead of them
    let entries: Vec<_> = logs.into_iter().map(|r| r.entry).collect();
    assert_eq!(
        entries,
        vec![
            LogEntry::Arrived {
                job: 0,
                requiring: 8.0
            },
            LogEntry::Queued { job: 1, ahead: 1 },
            LogEntry::Queued { job: 2, ahead: 2 },
        ]
    );
    assert_eq!(engine.preprocessor().station().queue_len(), 3);
    assert_eq!(engine.preprocessor().station().active_job(), Some(0));
}

#[test]
fn given_preprocessor_finishes_with_queue_when_splitting_then_next_job_starts() {
    // GIVEN: two jobs at the preprocessor
    let source = ScriptedVariates::new()
        .arrivals([1.0, 0.5])
        .preprocessing([2.0, 4.0])
        .servers([vec![1]])
        .subtasks([16.0]);
    let mut engine = Engine::new(config(1, 2, 1), source).unwrap();
    engine.step().unwrap();
    engine.step().unwrap();

    // WHEN: the first job finishes preprocessing at 3.0
    let log = engine.step().unwrap();

    // THEN: split, sub-task start, then the waiting job enters service
    let rendered: Vec<_> = log.iter().map(|r| r.to_string()).collect();
    assert_eq!(
        rendered,
        vec![
            "3.000000 - Job 0 split to servers [1]",
            "3.000000 - Server 1 started subtask on job 0, requiring 16.000000 time",
            "3.000000 - Preprocessor started job 1, requiring 4.000000 time",
        ]
    );
    assert_eq!(engine.servers().server(1).unwrap().active_job(), Some(0));
}

#[test]
fn given_busy_server_when_second_job_lands_on_it_then_subtask_waits() {
    // GIVEN: job 0 holds server 0 for a long time
    let source = ScriptedVariates::new()
        .arrivals([1.0, 1.0])
        .preprocessing([0.5, 0.5])
        .servers([vec![0], vec![0]])
        .subtasks([32.0, 1.0]);
    let mut engine = Engine::new(config(1, 2, 2), source).unwrap();
    for _ in 0..3 {
        engine.step().unwrap();
    }

    // WHEN: job 1 is split onto the same server at 2.5
    let log = engine.step().unwrap();

    // THEN: no sub-task start is logged, the sub-task queues
    assert_eq!(log.len(), 1);
    assert!(matches!(log[0].entry, LogEntry::Split { job: 1, .. }));
    let server = engine.servers().server(0).unwrap();
    assert_eq!(server.queue_len(), 2);
    assert_eq!(server.active_job(), Some(0));
    assert_eq!(engine.joins().outstanding(1), Some(1));
}

#[test]
fn given_fan_out_above_servers_when_building_then_rejected_without_draws() {
    // GIVEN: n = 4 on a pool of 3
    let mut source = ScriptedVariates::new().arrivals([1.0]);

    // WHEN
    let rejected = Engine::new(config(4, 3, 1), &mut source).is_err();

    // THEN
    assert!(rejected);
    assert_eq!(source.draws(), 0, "No draw before validation");
    assert_eq!(source.remaining(), (1, 0, 0, 0));
}

#[test]
fn given_invalid_config_when_running_single_then_config_error() {
    let result = run_single(&config(11, 10, 5).with_seed(1));
    assert!(matches!(
        result,
        Err(RunError::Config(ConfigError::FanOutExceedsServers {
            fan_out: 11,
            servers: 10
        }))
    ));
}
