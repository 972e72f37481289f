//! Human-readable and JSON rendering of command results.

use chrono::{DateTime, Utc};
use serde::Serialize;

use harvester::{Execution, Job, JobEvent, JobEventKind, JobStatistics, ScheduleDescriptor};

pub struct Printer {
    json: bool,
}

impl Printer {
    pub fn new(json: bool) -> Self {
        Self { json }
    }

    pub fn is_json(&self) -> bool {
        self.json
    }

    pub fn json<T: Serialize + ?Sized>(&self, value: &T) -> anyhow::Result<()> {
        println!("{}", serde_json::to_string_pretty(value)?);
        Ok(())
    }

    pub fn message(&self, text: &str) {
        if !self.json {
            println!("{}", text);
        }
    }

    pub fn jobs(&self, jobs: &[Job]) -> anyhow::Result<()> {
        if self.json {
            return self.json(jobs);
        }
        if jobs.is_empty() {
            println!("No jobs");
            return Ok(());
        }
        println!(
            "{:<36} {:<24} {:<18} {:<10} {:<8} {:>8}",
            "ID", "NAME", "KIND", "STATUS", "PRIORITY", "PROGRESS"
        );
        for job in jobs {
            println!(
                "{:<36} {:<24} {:<18} {:<10} {:<8} {:>7.1}%",
                job.id,
                truncate(&job.name, 24),
                job.kind,
                job.status,
                job.priority,
                job.progress()
            );
        }
        Ok(())
    }

    pub fn job(&self, job: &Job) -> anyhow::Result<()> {
        if self.json {
            return self.json(job);
        }
        println!("{} ({})", job.name, job.id);
        println!("  kind:       {}", job.kind);
        println!("  status:     {}", job.status);
        println!("  priority:   {}", job.priority);
        println!(
            "  progress:   {}/{} ({} ok, {} failed, {} items)",
            job.processed, job.total, job.succeeded, job.failed, job.extracted_count
        );
        println!("  created:    {}", timestamp(Some(job.created_at)));
        println!("  last run:   {}", timestamp(job.last_run));
        println!("  next run:   {}", timestamp(job.next_run));
        if let Some(expression) = &job.schedule_expression {
            println!("  cron:       {}", expression);
        }
        if let Some(location) = &job.output_location {
            println!("  output:     {}", location);
        }
        if let Some(error) = &job.error_message {
            println!("  error:      {}", error);
        }
        println!("  targets:");
        for target in &job.targets {
            println!("    - {}", target);
        }
        Ok(())
    }

    pub fn executions(&self, executions: &[Execution]) -> anyhow::Result<()> {
        if self.json {
            return self.json(executions);
        }
        if executions.is_empty() {
            println!("No executions");
            return Ok(());
        }
        println!(
            "{:<36} {:<36} {:<10} {:>5} {:>5} {:>6} {:>9}",
            "EXECUTION", "JOB", "STATUS", "OK", "FAIL", "ITEMS", "DURATION"
        );
        for execution in executions {
            let duration = execution
                .performance
                .map(|p| format!("{:.1}s", p.duration_secs))
                .unwrap_or_else(|| "-".to_string());
            println!(
                "{:<36} {:<36} {:<10} {:>5} {:>5} {:>6} {:>9}",
                execution.id,
                execution.job_id,
                execution.status,
                execution.succeeded,
                execution.failed,
                execution.extracted_count,
                duration
            );
        }
        Ok(())
    }

    pub fn execution_summary(&self, execution: &Execution) -> anyhow::Result<()> {
        if self.json {
            return self.json(execution);
        }
        println!(
            "Execution {} {}: {} processed, {} succeeded, {} failed, {} items",
            execution.id,
            execution.status,
            execution.processed,
            execution.succeeded,
            execution.failed,
            execution.extracted_count
        );
        for error in &execution.errors {
            println!("  ! {}", error);
        }
        if let Some(error) = &execution.error_message {
            println!("  error: {}", error);
        }
        Ok(())
    }

    pub fn statistics(&self, stats: &JobStatistics) -> anyhow::Result<()> {
        if self.json {
            return self.json(stats);
        }
        println!("Jobs:       {} ({} running)", stats.total_jobs, stats.running_jobs);
        println!("Executions: {}", stats.total_executions);
        println!("By status:");
        for (status, count) in &stats.by_status {
            println!("  {:<18} {}", status, count);
        }
        println!("By kind:");
        for (kind, count) in &stats.by_kind {
            println!("  {:<18} {}", kind, count);
        }
        println!("By priority:");
        for (priority, count) in &stats.by_priority {
            println!("  {:<18} {}", priority, count);
        }
        Ok(())
    }

    pub fn schedules<'a>(
        &self,
        schedules: impl IntoIterator<Item = (&'a String, &'a ScheduleDescriptor)>,
    ) -> anyhow::Result<()> {
        let schedules: Vec<_> = schedules.into_iter().collect();
        if self.json {
            let map: std::collections::BTreeMap<_, _> = schedules.into_iter().collect();
            return self.json(&map);
        }
        if schedules.is_empty() {
            println!("No scheduled jobs");
            return Ok(());
        }
        println!(
            "{:<36} {:<30} {:<20} {:<20}",
            "JOB", "SCHEDULE", "NEXT RUN", "LAST RUN"
        );
        for (job_id, descriptor) in schedules {
            println!(
                "{:<36} {:<30} {:<20} {:<20}",
                job_id,
                truncate(&descriptor.description, 30),
                timestamp(descriptor.next_run),
                timestamp(descriptor.last_run)
            );
        }
        Ok(())
    }

    pub fn event(&self, event: &JobEvent) -> anyhow::Result<()> {
        if self.json {
            println!("{}", serde_json::to_string(event)?);
            return Ok(());
        }
        match &event.kind {
            JobEventKind::Started { total } => {
                println!("Started {} ({} targets)", event.execution_id, total)
            }
            JobEventKind::ItemProcessed {
                processed,
                total,
                succeeded,
                failed,
            } => println!(
                "  [{}/{}] {} ok, {} failed",
                processed, total, succeeded, failed
            ),
            JobEventKind::Finished { status, error } => match error {
                Some(error) => println!("Finished: {} ({})", status, error),
                None => println!("Finished: {}", status),
            },
        }
        Ok(())
    }
}

fn timestamp(value: Option<DateTime<Utc>>) -> String {
    value
        .map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
        .unwrap_or_else(|| "-".to_string())
}

fn truncate(text: &str, width: usize) -> String {
    if text.chars().count() <= width {
        return text.to_string();
    }
    let mut cut: String = text.chars().take(width.saturating_sub(1)).collect();
    cut.push('…');
    cut
}
