use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use chrono::Local;

use super::store::{Medicine, MedicineStore};

const SHUTDOWN_POLL: Duration = Duration::from_millis(250);

/// 服用時刻になった薬を1分につき1回だけ通知する
pub struct MedicineReminder {
    store: MedicineStore,
    notified: HashSet<u32>,
    last_minute: Option<String>,
}

impl MedicineReminder {
    pub fn new(store: MedicineStore) -> Self {
        Self {
            store,
            notified: HashSet::new(),
            last_minute: None,
        }
    }

    pub fn store(&self) -> &MedicineStore {
        &self.store
    }

    /// `now` ("HH:MM") に服用すべき未通知の薬を返す
    ///
    /// 分が変わったら通知済みをクリアし、CLIなどでの変更を反映するためにファイルを読み直す。
    pub fn check(&mut self, now: &str) -> Vec<Medicine> {
        if self.last_minute.as_deref() != Some(now) {
            self.last_minute = Some(now.to_string());
            self.notified.clear();
            self.store.reload();
        }

        let due: Vec<Medicine> = self
            .store
            .due_at(now)
            .into_iter()
            .filter(|m| !self.notified.contains(&m.id))
            .cloned()
            .collect();
        self.notified.extend(due.iter().map(|m| m.id));
        due
    }

    pub fn check_now(&mut self) -> Vec<Medicine> {
        let now = Local::now().format("%H:%M").to_string();
        self.check(&now)
    }

    /// `shutdown` が立つまで `interval` ごとに確認する
    pub fn run<F>(&mut self, shutdown: &AtomicBool, interval: Duration, mut on_due: F)
    where
        F: FnMut(&[Medicine]),
    {
        tracing::info!(count = self.store.len(), interval_secs = interval.as_secs(), "medicine reminder started");

        while !shutdown.load(Ordering::Relaxed) {
            let due = self.check_now();
            if !due.is_empty() {
                on_due(&due);
            }

            let deadline = Instant::now() + interval;
            while Instant::now() < deadline && !shutdown.load(Ordering::Relaxed) {
                std::thread::sleep(SHUTDOWN_POLL.min(deadline.saturating_duration_since(Instant::now())));
            }
        }

        tracing::info!("medicine reminder stopped");
    }
}

/// 通知ログ用の1行表現
pub fn describe(medicine: &Medicine) -> String {
    let mut line = format!("{} at {}", medicine.name, medicine.taken_time);
    if !medicine.dosage.is_empty() {
        line.push_str(&format!(", dosage {}", medicine.dosage));
    }
    if !medicine.uses.is_empty() {
        line.push_str(&format!(" ({})", medicine.uses.join(", ")));
    }
    line
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::medicine::store::NewMedicine;

    fn reminder_with(entries: &[(&str, &str)]) -> (tempfile::TempDir, MedicineReminder) {
        let dir = tempfile::tempdir().unwrap();
        let mut store = MedicineStore::open(dir.path().join("medicine_data.json"));
        for (name, time) in entries {
            store
                .add(NewMedicine {
                    name: name.to_string(),
                    taken_time: time.to_string(),
                    ..Default::default()
                })
                .unwrap();
        }
        (dir, MedicineReminder::new(store))
    }

    #[test]
    fn test_due_medicines_notified_once_per_minute() {
        let (_dir, mut reminder) = reminder_with(&[("Aspirin", "08:00"), ("Zinc", "08:00"), ("Iron", "09:00")]);

        let due = reminder.check("08:00");
        let names: Vec<&str> = due.iter().map(|m| m.name.as_str()).collect();
        assert_eq!(names, vec!["Aspirin", "Zinc"]);

        assert!(reminder.check("08:00").is_empty());
        assert!(reminder.check("08:01").is_empty());
        assert_eq!(reminder.check("09:00").len(), 1);
    }

    #[test]
    fn test_same_time_next_day_notifies_again() {
        let (_dir, mut reminder) = reminder_with(&[("Aspirin", "08:00")]);
        assert_eq!(reminder.check("08:00").len(), 1);
        reminder.check("12:00");
        assert_eq!(reminder.check("08:00").len(), 1);
    }

    #[test]
    fn test_picks_up_external_changes_on_new_minute() {
        let (_dir, mut reminder) = reminder_with(&[("Aspirin", "08:00")]);
        reminder.check("07:59");

        // 別プロセス（CLI）による追加
        let mut other = MedicineStore::open(reminder.store().path());
        other
            .add(NewMedicine {
                name: "Iron".to_string(),
                taken_time: "08:00".to_string(),
                ..Default::default()
            })
            .unwrap();

        assert_eq!(reminder.check("08:00").len(), 2);
    }

    #[test]
    fn test_run_stops_on_shutdown() {
        let (_dir, mut reminder) = reminder_with(&[]);
        let shutdown = AtomicBool::new(true);
        let mut calls = 0;
        reminder.run(&shutdown, Duration::from_secs(20), |_| calls += 1);
        assert_eq!(calls, 0);
    }

    #[test]
    fn test_describe() {
        let medicine = Medicine {
            id: 1,
            name: "Aspirin".to_string(),
            taken_time: "08:00".to_string(),
            dosage: "1 tablet".to_string(),
            uses: vec!["pain".to_string(), "fever".to_string()],
            side_effects: Vec::new(),
        };
        assert_eq!(describe(&medicine), "Aspirin at 08:00, dosage 1 tablet (pain, fever)");
    }
}
